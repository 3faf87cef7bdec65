//! Render orchestration.
//!
//! A render moves through `Fetching → Normalizing → Sequencing → Captioning
//! → Mixing → Exporting → Done`. Only an empty timeline, the render
//! timeout, or an unhandled failure ends in `Failed`; everything else is
//! absorbed as a warning on the result.
//!
//! The render timeout covers composition up to the prepared artifacts.
//! Delivery starts only once they exist, so a timed-out render never leaves
//! a partial upload behind.

pub mod scenes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{info, warn, Instrument};

use vcomp_media::{
    burn_captions, mix_music, CaptionCanvas, Clip, FfmpegBackend, MediaBackend, MediaFetcher,
    MusicBed, NormalizeOptions, Sequencer,
};
use vcomp_models::timeline::plan_boundaries;
use vcomp_models::{
    EncodingConfig, FailureKind, ProjectRequest, RenderResult, RenderStage, RenderWarning,
};
use vcomp_storage::{BlobStore, NullBlobStore, S3BlobStore, S3Config};

use crate::config::RenderConfig;
use crate::error::{PipelineResult, RenderError};
use crate::export::bundle::BundleTimeline;
use crate::export::{Exporter, PreparedExport};
use crate::logging::RenderLogger;
use crate::metrics;
use scenes::{fetch_scenes, normalize_scenes};

const SCRATCH_PREFIX: &str = "vcomp-";

/// Runs composition requests to completion.
pub struct Renderer {
    config: RenderConfig,
    backend: Arc<dyn MediaBackend>,
    fetcher: MediaFetcher,
}

impl Renderer {
    /// Renderer backed by the ffmpeg binaries on `PATH`.
    pub fn new(config: RenderConfig) -> Self {
        let backend = FfmpegBackend::new().with_timeout(config.ffmpeg_timeout.as_secs());
        Self::with_backend(config, Arc::new(backend))
    }

    pub fn with_backend(config: RenderConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let fetcher = MediaFetcher::new(config.fetch_timeout);
        Self {
            config,
            backend,
            fetcher,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render a request, delivering through the blob store its credentials
    /// describe, or inline without them.
    pub async fn render(&self, request: &ProjectRequest) -> RenderResult {
        let mut warnings = Vec::new();
        let store: Box<dyn BlobStore> = match S3Config::from_credentials(&request.storage) {
            None => Box::new(NullBlobStore),
            Some(config) => match S3BlobStore::new(config) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    warn!(error = %e, "Blob store unavailable, artifacts will be inline");
                    warnings.push(RenderWarning::new(
                        RenderStage::Exporting,
                        FailureKind::UploadFailed,
                        format!("blob store unavailable, artifacts returned inline: {}", e),
                    ));
                    Box::new(NullBlobStore)
                }
            },
        };
        self.execute(request, store.as_ref(), warnings).await
    }

    /// Render a request through an explicit blob store.
    pub async fn render_with_store(
        &self,
        request: &ProjectRequest,
        store: &dyn BlobStore,
    ) -> RenderResult {
        self.execute(request, store, Vec::new()).await
    }

    async fn execute(
        &self,
        request: &ProjectRequest,
        store: &dyn BlobStore,
        mut warnings: Vec<RenderWarning>,
    ) -> RenderResult {
        let logger = RenderLogger::new(&request.project_id, request.scenes.len());
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&request.project_name);
            metrics::record_render_started();
            for warning in &warnings {
                logger.log_warning(warning);
                metrics::record_warning(warning);
            }

            let outcome = self
                .run_with_timeout(request, store, &logger, &mut warnings)
                .await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(mut result) => {
                    result.warnings = warnings;
                    metrics::record_render_completed(elapsed, result.is_degraded());
                    logger.log_completion(&result, elapsed);
                    result
                }
                Err(e) => {
                    let kind = e.kind();
                    let message = e.to_string();
                    logger.log_stage(RenderStage::Failed);
                    logger.log_error(kind, &message);
                    metrics::record_render_failed(kind, elapsed);
                    RenderResult::failed(kind, message, warnings)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_with_timeout(
        &self,
        request: &ProjectRequest,
        store: &dyn BlobStore,
        logger: &RenderLogger,
        warnings: &mut Vec<RenderWarning>,
    ) -> PipelineResult<RenderResult> {
        request.validate()?;

        // Removed on drop, whatever the outcome.
        let scratch = self.scratch_dir()?;
        let limit = self.config.render_timeout;
        let prepared =
            match tokio::time::timeout(limit, self.run(request, scratch.path(), logger, warnings))
                .await
            {
                Ok(prepared) => prepared?,
                Err(_) => return Err(RenderError::Timeout(limit.as_secs())),
            };

        let exporter = Exporter::new(
            self.backend.as_ref(),
            store,
            scratch.path(),
            self.config.artifacts_dir.as_deref(),
        );
        let mut result = exporter.deliver(request, prepared).await?;
        absorb(logger, warnings, std::mem::take(&mut result.warnings));

        logger.log_stage(RenderStage::Done);
        Ok(result)
    }

    fn scratch_dir(&self) -> PipelineResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.config.work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn run(
        &self,
        request: &ProjectRequest,
        work_dir: &Path,
        logger: &RenderLogger,
        warnings: &mut Vec<RenderWarning>,
    ) -> PipelineResult<PreparedExport> {
        let backend = self.backend.as_ref();
        let parallel = self.config.max_scene_parallel;
        let attempted = request.scenes.len();

        logger.log_stage(RenderStage::Fetching);
        let fetched = fetch_scenes(&self.fetcher, &request.scenes, work_dir, parallel).await?;
        absorb(logger, warnings, fetched.warnings);
        let music_file = self.fetch_music(request, work_dir, logger, warnings).await;
        if fetched.ready.is_empty() {
            metrics::record_scenes_dropped(attempted);
            return Err(RenderError::NoValidScenes { attempted });
        }

        let (width, height) = request.resolution.dimensions();
        let encoding =
            EncodingConfig::for_scene_count(attempted, self.config.fast_preset_threshold);
        let opts = NormalizeOptions {
            width,
            height,
            fps: request.fps,
            ken_burns: request.ken_burns.unwrap_or(self.config.ken_burns),
            encoding: encoding.clone(),
        };

        logger.log_stage(RenderStage::Normalizing);
        let prepared = normalize_scenes(backend, fetched.ready, work_dir, &opts, parallel).await?;
        absorb(logger, warnings, prepared.warnings);
        let scenes = prepared.ready;
        metrics::record_scenes_dropped(attempted - scenes.len());
        if scenes.is_empty() {
            return Err(RenderError::NoValidScenes { attempted });
        }

        logger.log_stage(RenderStage::Sequencing);
        let plan: Vec<_> = scenes
            .iter()
            .map(|s| {
                (
                    s.scene().id.clone(),
                    s.clip.duration,
                    s.scene().transition_to_next.clone(),
                )
            })
            .collect();
        let boundaries =
            plan_boundaries(&plan, request.transition.as_ref(), request.transition_duration);
        let clips: Vec<Clip> = scenes.iter().map(|s| s.clip.clone()).collect();
        let sequenced = Sequencer::new(backend, work_dir, encoding.clone())
            .sequence(&clips, &boundaries)
            .await?;
        absorb(logger, warnings, sequenced.outcome.warnings);
        let mut clip = sequenced.outcome.clip;
        info!(
            scenes = scenes.len(),
            duration = clip.duration,
            "Timeline sequenced"
        );

        logger.log_stage(RenderStage::Captioning);
        let canvas = CaptionCanvas {
            width,
            height,
            font_file: self.config.caption_font.clone(),
        };
        let captioned = burn_captions(
            backend,
            clip,
            &request.captions,
            request.caption_style.as_ref(),
            &canvas,
            &work_dir.join("captioned.mp4"),
            &encoding,
        )
        .await;
        absorb(logger, warnings, captioned.warnings);
        clip = captioned.clip;

        logger.log_stage(RenderStage::Mixing);
        if let (Some(path), Some(music), Some(envelope)) =
            (&music_file, &request.music, request.music_envelope())
        {
            let bed = MusicBed {
                envelope,
                start_offset: music.start_offset,
            };
            let mixed = mix_music(
                backend,
                clip,
                path,
                &bed,
                &work_dir.join("mixed.mp4"),
                &encoding,
            )
            .await;
            absorb(logger, warnings, mixed.warnings);
            clip = mixed.clip;
        }

        logger.log_stage(RenderStage::Exporting);
        let timeline = request.output_format.wants_bundle().then(|| {
            BundleTimeline::from_render(
                request,
                &scenes,
                &sequenced.applied,
                music_file.as_deref(),
                clip.duration,
            )
        });
        let exporter = Exporter::new(backend, &NullBlobStore, work_dir, None);
        let mut prepared = exporter.prepare(request, clip, timeline).await?;
        absorb(logger, warnings, std::mem::take(&mut prepared.warnings));
        Ok(prepared)
    }

    /// Fetch the music bed. A failure drops the music, not the render.
    async fn fetch_music(
        &self,
        request: &ProjectRequest,
        work_dir: &Path,
        logger: &RenderLogger,
        warnings: &mut Vec<RenderWarning>,
    ) -> Option<PathBuf> {
        let music = request.music.as_ref()?;
        match self.fetcher.fetch(&music.audio_url, &work_dir.join("music")).await {
            Ok(path) => Some(path),
            Err(e) => {
                let warning = RenderWarning::new(
                    RenderStage::Fetching,
                    FailureKind::SourceUnavailable,
                    format!("background music omitted: {}", e),
                );
                absorb(logger, warnings, vec![warning]);
                None
            }
        }
    }
}

fn absorb(logger: &RenderLogger, warnings: &mut Vec<RenderWarning>, new: Vec<RenderWarning>) {
    for warning in new {
        logger.log_warning(&warning);
        metrics::record_warning(&warning);
        warnings.push(warning);
    }
}
