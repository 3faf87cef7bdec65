//! Background music mixing.

use std::path::Path;
use tracing::{info, warn};

use vcomp_models::{EncodingConfig, FadeSchedule, FailureKind, RenderStage, RenderWarning, ResolvedEnvelope};

use crate::backend::MediaBackend;
use crate::clip::{Clip, StageOutcome};
use crate::command::{FfmpegCommand, FfmpegInput};
use crate::filter_graph::{secs, Filter, FilterChain, FilterGraph};

/// Music settings for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicBed {
    pub envelope: ResolvedEnvelope,
    /// Seconds trimmed from the start of the track
    pub start_offset: f64,
}

/// Command mixing `music` under the audio of `input`.
///
/// The fade-out is scheduled against the input's length so it ends exactly
/// with the video; the existing audio decides the mixed length.
pub fn music_command(
    input: &Clip,
    music: &Path,
    bed: &MusicBed,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let schedule = FadeSchedule::new(&bed.envelope, input.duration);

    let mut shaping = FilterChain::from_pads(["1:a"])
        .filter(Filter::new("volume").positional(format!("{:.3}", bed.envelope.volume)));
    if let Some(fade_in) = schedule.fade_in {
        shaping = shaping.filter(
            Filter::new("afade")
                .arg("t", "in")
                .arg("st", 0)
                .arg("d", secs(fade_in)),
        );
    }
    if let Some((start, length)) = schedule.fade_out {
        shaping = shaping.filter(
            Filter::new("afade")
                .arg("t", "out")
                .arg("st", secs(start))
                .arg("d", secs(length)),
        );
    }

    let graph = FilterGraph::new()
        .chain(shaping.output("music"))
        .chain(
            FilterChain::from_pads(["0:a", "music"])
                .filter(
                    Filter::new("amix")
                        .arg("inputs", 2)
                        .arg("duration", "first")
                        .arg("normalize", 0),
                )
                .output("a"),
        );

    let mut music_input = FfmpegInput::file(music);
    if bed.start_offset > 0.0 {
        music_input = music_input.seek(bed.start_offset);
    }

    FfmpegCommand::new("mix_music", output)
        .input(&input.path)
        .input_spec(music_input)
        .filter_complex(graph.render())
        .map("0:v")
        .map("[a]")
        .video_codec("copy")
        .output_args(encoding.audio_args())
        .expect_duration(input.duration)
}

/// Mix background music, passing the input through when mixing fails.
pub async fn mix_music(
    backend: &dyn MediaBackend,
    input: Clip,
    music: &Path,
    bed: &MusicBed,
    output: &Path,
    encoding: &EncodingConfig,
) -> StageOutcome {
    let cmd = music_command(&input, music, bed, output, encoding);
    match backend.run(&cmd).await {
        Ok(()) => {
            info!(volume = bed.envelope.volume, "Background music mixed");
            StageOutcome::transformed(Clip::new(output, input.duration))
        }
        Err(e) => {
            warn!(error = %e, "Music mixing failed, continuing without music");
            StageOutcome::passed_through(
                input,
                RenderWarning::new(
                    RenderStage::Mixing,
                    FailureKind::OverlayFailed,
                    format!("music omitted: {}", e),
                ),
            )
        }
    }
}
