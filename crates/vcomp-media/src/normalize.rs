//! Scene normalization.
//!
//! Every scene becomes a clip with the project's frame size and rate, a
//! stereo 44.1 kHz audio track, and exactly its declared duration.

use std::path::Path;
use tracing::{debug, info};

use vcomp_models::EncodingConfig;

use crate::backend::MediaBackend;
use crate::clip::{silent_audio_input, Clip, AUDIO_CHANNEL_LAYOUT, AUDIO_SAMPLE_RATE};
use crate::command::{FfmpegCommand, FfmpegInput};
use crate::error::{MediaError, MediaResult};
use crate::filter_graph::{secs, Filter, FilterChain, FilterGraph};

/// Zoom factor reached at the end of a Ken Burns move.
pub const KEN_BURNS_MAX_ZOOM: f64 = 1.1;

/// Output format shared by all normalized clips.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Slow zoom on stills instead of a static frame
    pub ken_burns: bool,
    pub encoding: EncodingConfig,
}

impl NormalizeOptions {
    pub fn frame_count(&self, duration: f64) -> u64 {
        ((duration * self.fps as f64).round() as u64).max(1)
    }
}

/// Scale into the frame preserving aspect ratio, letterboxing the rest.
fn fit_frame(chain: FilterChain, width: u32, height: u32) -> FilterChain {
    chain
        .filter(
            Filter::new("scale")
                .arg("w", width)
                .arg("h", height)
                .arg("force_original_aspect_ratio", "decrease"),
        )
        .filter(
            Filter::new("pad")
                .arg("w", width)
                .arg("h", height)
                .arg("x", "(ow-iw)/2")
                .arg("y", "(oh-ih)/2")
                .arg("color", "black"),
        )
        .filter(Filter::new("setsar").positional(1))
}

fn normalized_audio(chain: FilterChain, duration: f64) -> FilterChain {
    chain
        .filter(Filter::new("aresample").positional(AUDIO_SAMPLE_RATE))
        .filter(
            Filter::new("aformat")
                .arg("channel_layouts", AUDIO_CHANNEL_LAYOUT)
                .arg("sample_rates", AUDIO_SAMPLE_RATE),
        )
        .filter(Filter::new("apad"))
        .filter(Filter::new("atrim").arg("duration", secs(duration)))
        .filter(Filter::new("asetpts").positional("PTS-STARTPTS"))
}

/// Command normalizing a video source.
///
/// Short sources hold their last frame; long ones are cut. Sources without
/// audio get a silent track.
pub fn video_command(
    source: &Path,
    has_audio: bool,
    output: &Path,
    duration: f64,
    opts: &NormalizeOptions,
) -> FfmpegCommand {
    let video = fit_frame(FilterChain::from_pads(["0:v"]), opts.width, opts.height)
        .filter(Filter::new("fps").arg("fps", opts.fps))
        .filter(
            Filter::new("tpad")
                .arg("stop_mode", "clone")
                .arg("stop_duration", secs(duration)),
        )
        .filter(Filter::new("trim").arg("duration", secs(duration)))
        .filter(Filter::new("setpts").positional("PTS-STARTPTS"))
        .filter(Filter::new("format").arg("pix_fmts", &opts.encoding.pixel_format))
        .output("v");

    let mut graph = FilterGraph::new().chain(video);
    let mut cmd = FfmpegCommand::new("normalize_video", output).input(source);

    let audio_pad = if has_audio { "0:a" } else { "1:a" };
    if !has_audio {
        cmd = cmd.input_spec(silent_audio_input(duration));
    }
    graph.push(normalized_audio(FilterChain::from_pads([audio_pad]), duration).output("a"));

    cmd.filter_complex(graph.render())
        .map("[v]")
        .map("[a]")
        .encoding(&opts.encoding)
        .frame_rate(opts.fps)
        .output_duration(duration)
        .expect_duration(duration)
}

/// Command turning a still image into a clip, with a slow centered zoom
/// when Ken Burns is enabled.
pub fn image_command(
    source: &Path,
    output: &Path,
    duration: f64,
    opts: &NormalizeOptions,
) -> FfmpegCommand {
    let frames = opts.frame_count(duration);
    let size = format!("{}x{}", opts.width, opts.height);

    let (image_input, video) = if opts.ken_burns {
        let increment = (KEN_BURNS_MAX_ZOOM - 1.0) / frames as f64;
        // Upscale first so the zoom does not shimmer
        let chain = fit_frame(
            FilterChain::from_pads(["0:v"]),
            opts.width * 2,
            opts.height * 2,
        )
        .filter(
            Filter::new("zoompan")
                .arg("z", format!("min(zoom+{:.6},{})", increment, KEN_BURNS_MAX_ZOOM))
                .arg("x", "iw/2-(iw/zoom/2)")
                .arg("y", "ih/2-(ih/zoom/2)")
                .arg("d", frames)
                .arg("s", &size)
                .arg("fps", opts.fps),
        );
        (FfmpegInput::file(source), chain)
    } else {
        let input = FfmpegInput::file(source)
            .arg("-loop")
            .arg("1")
            .arg("-framerate")
            .arg(opts.fps.to_string());
        let chain = fit_frame(FilterChain::from_pads(["0:v"]), opts.width, opts.height);
        (input, chain)
    };

    let video = video
        .filter(Filter::new("trim").arg("duration", secs(duration)))
        .filter(Filter::new("setpts").positional("PTS-STARTPTS"))
        .filter(Filter::new("format").arg("pix_fmts", &opts.encoding.pixel_format))
        .output("v");

    FfmpegCommand::new("normalize_image", output)
        .input_spec(image_input)
        .input_spec(silent_audio_input(duration))
        .filter_complex(FilterGraph::new().chain(video).render())
        .map("[v]")
        .map("1:a")
        .encoding(&opts.encoding)
        .frame_rate(opts.fps)
        .output_duration(duration)
        .expect_duration(duration)
}

/// Normalize one fetched scene source.
pub async fn normalize_scene(
    backend: &dyn MediaBackend,
    source: &Path,
    is_image: bool,
    output: &Path,
    duration: f64,
    opts: &NormalizeOptions,
) -> MediaResult<Clip> {
    let cmd = if is_image {
        image_command(source, output, duration, opts)
    } else {
        let info = backend.probe(source).await?;
        if !info.has_video {
            return Err(MediaError::InvalidMedia(format!(
                "{} has no video stream",
                source.display()
            )));
        }
        debug!(
            source = %source.display(),
            source_duration = info.duration,
            has_audio = info.has_audio,
            "Normalizing video source"
        );
        video_command(source, info.has_audio, output, duration, opts)
    };

    backend.run(&cmd).await?;
    info!(output = %output.display(), duration, is_image, "Scene normalized");
    Ok(Clip::new(output, duration))
}
