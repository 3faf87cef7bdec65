//! Per-scene voiceover mixing.

use std::path::{Path, PathBuf};
use tracing::debug;

use vcomp_models::timeline::delay_millis;
use vcomp_models::EncodingConfig;

use crate::backend::MediaBackend;
use crate::clip::{silent_audio_input, Clip};
use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::filter_graph::{secs, Filter, FilterChain, FilterGraph};

/// A fetched voice track placed within its scene.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTrack {
    pub path: PathBuf,
    /// Seconds from the scene start
    pub start_offset: f64,
    /// 0-1
    pub volume: f64,
}

/// Build the audio mixing command for one scene, or `None` when the audio
/// stays as it is (no voiceovers and the original audio kept).
///
/// - strip + one voiceover: the voiceover alone, delayed to its offset
/// - strip + several: voiceovers mixed, lasting as long as the longest
/// - keep: voiceovers mixed over the original audio, which sets the length
/// - strip + none: silence
pub fn voiceover_command(
    clip: &Clip,
    tracks: &[VoiceTrack],
    strip_original_audio: bool,
    output: &Path,
    encoding: &EncodingConfig,
) -> Option<FfmpegCommand> {
    if tracks.is_empty() && !strip_original_audio {
        return None;
    }

    let mut cmd = FfmpegCommand::new("mix_voiceover", output).input(&clip.path);
    let mut graph = FilterGraph::new();

    if tracks.is_empty() {
        cmd = cmd.input_spec(silent_audio_input(clip.duration));
        return Some(finish(cmd, "1:a", clip, encoding));
    }

    let mut labels = Vec::with_capacity(tracks.len());
    for (i, track) in tracks.iter().enumerate() {
        cmd = cmd.input(&track.path);
        let ms = delay_millis(track.start_offset);
        let label = format!("vo{}", i);
        graph.push(
            FilterChain::from_pads([format!("{}:a", i + 1)])
                .filter(Filter::new("adelay").arg("delays", format!("{}|{}", ms, ms)))
                .filter(Filter::new("volume").positional(format!("{:.3}", track.volume)))
                .output(&label),
        );
        labels.push(label);
    }

    let mix = if strip_original_audio {
        if labels.len() == 1 {
            FilterChain::from_pads(labels.clone()).filter(Filter::new("anull"))
        } else {
            FilterChain::from_pads(labels.clone()).filter(
                Filter::new("amix")
                    .arg("inputs", labels.len())
                    .arg("duration", "longest")
                    .arg("normalize", 0),
            )
        }
    } else {
        let mut pads = vec!["0:a".to_string()];
        pads.extend(labels.iter().cloned());
        FilterChain::from_pads(pads).filter(
            Filter::new("amix")
                .arg("inputs", labels.len() + 1)
                .arg("duration", "first")
                .arg("normalize", 0),
        )
    };

    // The scene keeps its declared length whatever the tracks do
    graph.push(
        mix.filter(Filter::new("apad"))
            .filter(Filter::new("atrim").arg("duration", secs(clip.duration)))
            .output("a"),
    );

    Some(finish(
        cmd.filter_complex(graph.render()),
        "[a]",
        clip,
        encoding,
    ))
}

fn finish(cmd: FfmpegCommand, audio: &str, clip: &Clip, encoding: &EncodingConfig) -> FfmpegCommand {
    cmd.map("0:v")
        .map(audio)
        .video_codec("copy")
        .output_args(encoding.audio_args())
        .output_duration(clip.duration)
        .expect_duration(clip.duration)
}

/// Apply voiceovers to a normalized scene clip.
pub async fn apply_voiceovers(
    backend: &dyn MediaBackend,
    clip: Clip,
    tracks: &[VoiceTrack],
    strip_original_audio: bool,
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<Clip> {
    let Some(cmd) = voiceover_command(&clip, tracks, strip_original_audio, output, encoding)
    else {
        return Ok(clip);
    };

    debug!(
        tracks = tracks.len(),
        strip_original_audio, "Mixing scene voiceovers"
    );
    backend.run(&cmd).await?;
    Ok(Clip::new(output, clip.duration))
}
