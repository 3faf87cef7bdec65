//! Scene sequencing.
//!
//! A left fold over normalized clips in timeline order. Each boundary is
//! either an overlapping transition (`xfade` + `acrossfade`) or a lossless
//! concatenation. A transition that cannot be rendered degrades to a
//! concatenation with a warning.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use vcomp_models::timeline::{overlap_fits, transition_offset, Boundary};
use vcomp_models::{EncodingConfig, FailureKind, RenderStage, RenderWarning, TransitionKind};

use crate::backend::MediaBackend;
use crate::clip::{Clip, StageOutcome};
use crate::command::{FfmpegCommand, FfmpegInput};
use crate::error::{MediaError, MediaResult};
use crate::filter_graph::{secs, Filter, FilterChain, FilterGraph};

/// How one boundary will be joined.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPlan {
    Transition {
        xfade: &'static str,
        overlap: f64,
        offset: f64,
    },
    Concat {
        /// Why a planned transition became a cut
        fallback: Option<String>,
    },
}

/// Decide how to join the composed clip so far with the next one.
pub fn plan_join(composed_duration: f64, next_duration: f64, boundary: &Boundary) -> JoinPlan {
    if boundary.transition.is_unknown() {
        return JoinPlan::Concat {
            fallback: Some(format!("unknown transition '{}'", boundary.transition)),
        };
    }
    let Some(xfade) = boundary.transition.xfade_name() else {
        return JoinPlan::Concat { fallback: None };
    };
    if !overlap_fits(composed_duration, next_duration, boundary.overlap) {
        return JoinPlan::Concat {
            fallback: Some(format!(
                "{} of {}s does not fit clips of {:.3}s and {:.3}s",
                boundary.transition, boundary.overlap, composed_duration, next_duration
            )),
        };
    }
    JoinPlan::Transition {
        xfade,
        overlap: boundary.overlap,
        offset: transition_offset(composed_duration, boundary.overlap),
    }
}

/// Command blending `a` into `b` over `overlap` seconds starting at `offset`.
pub fn transition_command(
    a: &Clip,
    b: &Clip,
    xfade: &str,
    overlap: f64,
    offset: f64,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let graph = FilterGraph::new()
        .chain(
            FilterChain::from_pads(["0:v", "1:v"])
                .filter(
                    Filter::new("xfade")
                        .arg("transition", xfade)
                        .arg("duration", secs(overlap))
                        .arg("offset", secs(offset)),
                )
                .filter(Filter::new("format").arg("pix_fmts", &encoding.pixel_format))
                .output("v"),
        )
        .chain(
            FilterChain::from_pads(["0:a", "1:a"])
                .filter(Filter::new("acrossfade").arg("d", secs(overlap)))
                .output("a"),
        );

    FfmpegCommand::new("transition", output)
        .input(&a.path)
        .input(&b.path)
        .filter_complex(graph.render())
        .map("[v]")
        .map("[a]")
        .encoding(encoding)
        .expect_duration(a.duration + b.duration - overlap)
}

/// Quote a path for the concat demuxer list.
pub fn concat_list_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

/// Command concatenating clips listed in `list_file` without re-encoding.
pub fn concat_command(list_file: &Path, output: &Path, expected_duration: f64) -> FfmpegCommand {
    FfmpegCommand::new("concat", output)
        .input_spec(
            FfmpegInput::file(list_file)
                .arg("-f")
                .arg("concat")
                .arg("-safe")
                .arg("0"),
        )
        .copy_streams()
        .expect_duration(expected_duration)
}

/// Sequenced clip plus the joins that were actually rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced {
    pub outcome: StageOutcome,
    /// One per boundary; fallbacks appear as cuts with no overlap
    pub applied: Vec<Boundary>,
}

/// Sequences clips through a [`MediaBackend`].
pub struct Sequencer<'a> {
    backend: &'a dyn MediaBackend,
    work_dir: PathBuf,
    encoding: EncodingConfig,
}

impl<'a> Sequencer<'a> {
    pub fn new(backend: &'a dyn MediaBackend, work_dir: impl Into<PathBuf>, encoding: EncodingConfig) -> Self {
        Self {
            backend,
            work_dir: work_dir.into(),
            encoding,
        }
    }

    /// Fold `clips` into one clip. `boundaries[i]` joins `clips[i]` and
    /// `clips[i + 1]`.
    ///
    /// The result lasts the sum of the clip durations minus the overlaps of
    /// the transitions that were actually rendered.
    pub async fn sequence(&self, clips: &[Clip], boundaries: &[Boundary]) -> MediaResult<Sequenced> {
        let (first, rest) = clips
            .split_first()
            .ok_or_else(|| MediaError::internal("nothing to sequence"))?;
        if boundaries.len() < rest.len() {
            return Err(MediaError::internal(format!(
                "{} clips need {} boundaries, got {}",
                clips.len(),
                rest.len(),
                boundaries.len()
            )));
        }

        let mut composed = first.clone();
        let mut warnings = Vec::new();
        let mut applied = Vec::with_capacity(rest.len());

        for (i, (next, boundary)) in rest.iter().zip(boundaries).enumerate() {
            let step_output = self.work_dir.join(format!("sequence_{:03}.mp4", i));
            let mut join = boundary.clone();

            composed = match plan_join(composed.duration, next.duration, boundary) {
                JoinPlan::Transition { xfade, overlap, offset } => {
                    let cmd = transition_command(
                        &composed,
                        next,
                        xfade,
                        overlap,
                        offset,
                        &step_output,
                        &self.encoding,
                    );
                    match self.backend.run(&cmd).await {
                        Ok(()) => {
                            info!(
                                boundary = i,
                                transition = %boundary.transition,
                                offset,
                                "Applied transition"
                            );
                            applied.push(join);
                            Clip::new(&step_output, composed.duration + next.duration - overlap)
                        }
                        Err(e) => {
                            warn!(
                                boundary = i,
                                transition = %boundary.transition,
                                error = %e,
                                "Transition failed, falling back to concatenation"
                            );
                            warnings.push(transition_warning(
                                boundary,
                                format!("{} failed: {}", boundary.transition, e),
                            ));
                            applied.push(as_cut(join));
                            self.concat(&composed, next, &step_output).await?
                        }
                    }
                }
                JoinPlan::Concat { fallback } => {
                    if let Some(reason) = fallback {
                        warn!(boundary = i, reason = %reason, "Transition replaced by a cut");
                        warnings.push(transition_warning(boundary, reason));
                        join = as_cut(join);
                    }
                    applied.push(join);
                    self.concat(&composed, next, &step_output).await?
                }
            };
        }

        Ok(Sequenced {
            outcome: StageOutcome {
                clip: composed,
                warnings,
            },
            applied,
        })
    }

    async fn concat(&self, a: &Clip, b: &Clip, output: &Path) -> MediaResult<Clip> {
        let list_file = output.with_extension("txt");
        let list = format!(
            "{}\n{}\n",
            concat_list_entry(&a.path),
            concat_list_entry(&b.path)
        );
        fs::write(&list_file, list).await?;

        let duration = a.duration + b.duration;
        self.backend
            .run(&concat_command(&list_file, output, duration))
            .await?;
        Ok(Clip::new(output, duration))
    }
}

fn as_cut(mut boundary: Boundary) -> Boundary {
    boundary.transition = TransitionKind::None;
    boundary.overlap = 0.0;
    boundary
}

fn transition_warning(boundary: &Boundary, message: String) -> RenderWarning {
    RenderWarning::new(RenderStage::Sequencing, FailureKind::TransitionFailed, message)
        .for_scene(boundary.from_scene.clone())
}
