//! Caption burn-in.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use vcomp_models::{
    effective_style, Caption, CaptionStyle, EncodingConfig, FailureKind, RenderStage,
    RenderWarning,
};

use crate::backend::MediaBackend;
use crate::clip::{Clip, StageOutcome};
use crate::command::FfmpegCommand;
use crate::filter_graph::{secs, Filter, FilterChain, FilterGraph};

/// Border around the caption box, in pixels.
pub const BOX_BORDER: u32 = 10;

/// Frame and font settings for burning captions.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCanvas {
    pub width: u32,
    pub height: u32,
    /// Font file handed to drawtext; fontconfig default when absent
    pub font_file: Option<PathBuf>,
}

/// One `drawtext` filter for a caption, visible on `[start, end)`.
pub fn drawtext_filter(
    caption: &Caption,
    global: Option<&CaptionStyle>,
    canvas: &CaptionCanvas,
) -> Filter {
    let style = effective_style(&caption.style, global);
    let font_size = style.font_size.pixels_for_height(canvas.height);

    let mut filter = Filter::new("drawtext")
        .arg_opt(
            "fontfile",
            canvas.font_file.as_ref().map(|p| p.to_string_lossy()),
        )
        .arg("text", &caption.text)
        .arg("expansion", "none")
        .arg("fontsize", font_size)
        .arg("fontcolor", style.font_color.to_ffmpeg())
        .arg("x", "(w-text_w)/2")
        .arg("y", style.position.y_expression());

    if let Some(background) = style.background {
        filter = filter
            .arg("box", 1)
            .arg("boxcolor", background.to_ffmpeg())
            .arg("boxborderw", BOX_BORDER);
    }

    if style.shadow {
        let offset = (font_size / 18).max(1);
        filter = filter
            .arg("shadowcolor", "0x000000@0.75")
            .arg("shadowx", offset)
            .arg("shadowy", offset);
    }

    filter.arg(
        "enable",
        format!(
            "gte(t,{})*lt(t,{})",
            secs(caption.start_time),
            secs(caption.end_time)
        ),
    )
}

/// Command burning every caption into `input`, or `None` without captions.
pub fn caption_command(
    input: &Clip,
    captions: &[Caption],
    global: Option<&CaptionStyle>,
    canvas: &CaptionCanvas,
    output: &Path,
    encoding: &EncodingConfig,
) -> Option<FfmpegCommand> {
    if captions.is_empty() {
        return None;
    }

    let chain = captions
        .iter()
        .fold(FilterChain::from_pads(["0:v"]), |chain, caption| {
            chain.filter(drawtext_filter(caption, global, canvas))
        })
        .output("v");

    Some(
        FfmpegCommand::new("burn_captions", output)
            .input(&input.path)
            .filter_complex(FilterGraph::new().chain(chain).render())
            .map("[v]")
            .map("0:a?")
            .output_args(encoding.video_args())
            .audio_codec("copy")
            .expect_duration(input.duration),
    )
}

/// Burn captions, passing the input through unchanged when there are none
/// or when rendering fails.
pub async fn burn_captions(
    backend: &dyn MediaBackend,
    input: Clip,
    captions: &[Caption],
    global: Option<&CaptionStyle>,
    canvas: &CaptionCanvas,
    output: &Path,
    encoding: &EncodingConfig,
) -> StageOutcome {
    let Some(cmd) = caption_command(&input, captions, global, canvas, output, encoding) else {
        return StageOutcome::transformed(input);
    };

    match backend.run(&cmd).await {
        Ok(()) => {
            info!(captions = captions.len(), "Captions burned in");
            StageOutcome::transformed(Clip::new(output, input.duration))
        }
        Err(e) => {
            warn!(error = %e, "Caption burn-in failed, continuing without captions");
            StageOutcome::passed_through(
                input,
                RenderWarning::new(
                    RenderStage::Captioning,
                    FailureKind::OverlayFailed,
                    format!("captions omitted: {}", e),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcomp_models::{CaptionPosition, Color};

    fn canvas() -> CaptionCanvas {
        CaptionCanvas {
            width: 1920,
            height: 1080,
            font_file: None,
        }
    }

    #[test]
    fn test_drawtext_defaults() {
        let caption = Caption::new("Hello", 1.0, 2.5);
        let rendered = drawtext_filter(&caption, None, &canvas()).to_string();
        assert!(rendered.starts_with("drawtext=text=Hello:expansion=none:fontsize=36"));
        assert!(rendered.contains("fontcolor=0xFFFFFF@1.00"));
        assert!(rendered.contains("y=h*0.85"));
        assert!(rendered.contains("box=1:boxcolor=0x000000@0.50:boxborderw=10"));
        assert!(rendered.ends_with("enable=gte(t\\,1.000)*lt(t\\,2.500)"));
    }

    #[test]
    fn test_drawtext_escapes_user_text() {
        let caption = Caption::new("It's 10:30, [live]; ok", 0.0, 1.0);
        let rendered = drawtext_filter(&caption, None, &canvas()).to_string();
        assert!(rendered.contains("text=It\\\\\\'s 10\\\\:30\\, \\[live\\]\\; ok"));
    }

    #[test]
    fn test_style_override_and_shadow() {
        let global = CaptionStyle {
            position: Some(CaptionPosition::Top),
            shadow: Some(true),
            background_color: Some(Color::TRANSPARENT),
            ..Default::default()
        };
        let mut caption = Caption::new("x", 0.0, 1.0);
        caption.style.position = Some(CaptionPosition::Center);

        let filter = drawtext_filter(&caption, Some(&global), &canvas());
        assert_eq!(filter.get("y"), Some("(h-text_h)/2"));
        assert_eq!(filter.get("box"), None);
        assert!(filter.get("shadowx").is_some());
    }

    #[test]
    fn test_font_scales_with_frame() {
        let caption = Caption::new("x", 0.0, 1.0);
        let uhd = CaptionCanvas {
            width: 3840,
            height: 2160,
            font_file: Some(PathBuf::from("/fonts/Inter.ttf")),
        };
        let filter = drawtext_filter(&caption, None, &uhd);
        assert_eq!(filter.get("fontsize"), Some("72"));
        assert_eq!(filter.get("fontfile"), Some("/fonts/Inter.ttf"));
    }

    #[test]
    fn test_no_captions_no_command() {
        let clip = Clip::new("in.mp4", 4.0);
        assert!(caption_command(&clip, &[], None, &canvas(), Path::new("o.mp4"), &EncodingConfig::default()).is_none());

        let captions = vec![Caption::new("a", 0.0, 1.0), Caption::new("b", 1.0, 2.0)];
        let cmd = caption_command(&clip, &captions, None, &canvas(), Path::new("o.mp4"), &EncodingConfig::default()).unwrap();
        let graph = cmd.output_flag("-filter_complex").unwrap();
        assert_eq!(graph.matches("drawtext=").count(), 2);
        assert_eq!(cmd.output_flag("-c:a"), Some("copy"));
    }
}
