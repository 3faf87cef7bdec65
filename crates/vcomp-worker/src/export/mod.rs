//! Export stage.
//!
//! [`Exporter::prepare`] produces every requested artifact in the scratch
//! directory. [`Exporter::deliver`] then uploads or inlines them. Nothing is
//! uploaded until the timeline is complete, and delivery runs outside the
//! render timeout.

pub mod bundle;
pub mod delivery;

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use vcomp_media::fs_utils::{file_size, persist_artifact};
use vcomp_media::{Clip, FfmpegCommand, MediaBackend};
use vcomp_models::{generate_srt, FailureKind, ProjectRequest, RenderResult, RenderStage, RenderWarning};
use vcomp_storage::{BlobStore, BUNDLE_OBJECT, TRANSCRIPT_OBJECT, VIDEO_OBJECT};

use crate::error::PipelineResult;
use bundle::{build_bundle, write_bundle, BundleTimeline};
use delivery::{deliver, upload_copy};

/// Measured properties of the final video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalVideo {
    pub duration: f64,
    pub size: u64,
}

/// Artifacts written to the scratch directory, not yet delivered.
#[derive(Debug)]
pub struct PreparedExport {
    pub video: FinalVideo,
    video_path: PathBuf,
    srt: Option<(PathBuf, String)>,
    bundle_path: Option<PathBuf>,
    /// Warnings raised while preparing.
    pub warnings: Vec<RenderWarning>,
}

/// Writes and delivers the artifacts of one render.
pub struct Exporter<'a> {
    backend: &'a dyn MediaBackend,
    store: &'a dyn BlobStore,
    work_dir: &'a Path,
    artifacts_dir: Option<&'a Path>,
}

impl<'a> Exporter<'a> {
    pub fn new(
        backend: &'a dyn MediaBackend,
        store: &'a dyn BlobStore,
        work_dir: &'a Path,
        artifacts_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            backend,
            store,
            work_dir,
            artifacts_dir,
        }
    }

    /// Prepare and deliver in one go. The returned result carries only the
    /// warnings raised here.
    pub async fn export(
        &self,
        request: &ProjectRequest,
        clip: Clip,
        timeline: Option<BundleTimeline<'_>>,
    ) -> PipelineResult<RenderResult> {
        let mut prepared = self.prepare(request, clip, timeline).await?;
        let mut warnings = std::mem::take(&mut prepared.warnings);
        let mut result = self.deliver(request, prepared).await?;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Finalize the video and write the transcript and bundle next to it.
    pub async fn prepare(
        &self,
        request: &ProjectRequest,
        clip: Clip,
        timeline: Option<BundleTimeline<'_>>,
    ) -> PipelineResult<PreparedExport> {
        let mut warnings = Vec::new();

        let video_path = self.work_dir.join(VIDEO_OBJECT);
        let video = self.finalize(&clip, &video_path).await?;

        let srt = if request.include_srt && !request.captions.is_empty() {
            let path = self.work_dir.join(TRANSCRIPT_OBJECT);
            let content = generate_srt(&request.captions);
            fs::write(&path, &content).await?;
            Some((path, content))
        } else {
            None
        };

        let bundle_path = match timeline {
            Some(timeline) if request.output_format.wants_bundle() => {
                let path = self.work_dir.join(BUNDLE_OBJECT);
                let created = chrono::Utc::now().timestamp_micros();
                match write_bundle(build_bundle(&timeline, created), path.clone()).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!(error = %e, "Bundle export failed, omitting bundle");
                        warnings.push(RenderWarning::new(
                            RenderStage::Exporting,
                            FailureKind::InternalFailure,
                            format!("project bundle omitted: {}", e),
                        ));
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(PreparedExport {
            video,
            video_path,
            srt,
            bundle_path,
            warnings,
        })
    }

    /// Upload or inline the prepared artifacts. The returned result carries
    /// only the warnings raised while delivering.
    pub async fn deliver(
        &self,
        request: &ProjectRequest,
        prepared: PreparedExport,
    ) -> PipelineResult<RenderResult> {
        let mut result = RenderResult::complete();
        let mut warnings = Vec::new();
        result.duration = Some(prepared.video.duration);
        result.file_size = Some(prepared.video.size);

        let project_id = request.project_id.as_str();
        let mut delivered: Vec<PathBuf> = Vec::new();

        if request.output_format.wants_video() {
            let path = prepared.video_path;
            let (video, warning) = deliver(self.store, &path, project_id, VIDEO_OBJECT).await?;
            (result.video_url, result.video_base64) = video.into_fields();
            warnings.extend(warning);
            delivered.push(path);
        }

        if let Some(path) = prepared.bundle_path {
            let (draft, warning) = deliver(self.store, &path, project_id, BUNDLE_OBJECT).await?;
            (result.draft_url, result.draft_base64) = draft.into_fields();
            warnings.extend(warning);
            delivered.push(path);
        }

        if let Some((path, content)) = prepared.srt {
            let (url, warning) = upload_copy(self.store, &path, project_id, TRANSCRIPT_OBJECT).await;
            result.srt_url = url;
            result.srt_content = Some(content);
            warnings.extend(warning);
            delivered.push(path);
        }

        if let Some(dir) = self.artifacts_dir {
            self.keep_artifacts(&delivered, dir, project_id).await;
        }

        result.warnings = warnings;
        Ok(result)
    }

    /// Remux the composed clip with the index up front and measure it.
    async fn finalize(&self, clip: &Clip, output: &Path) -> PipelineResult<FinalVideo> {
        let cmd = FfmpegCommand::new("finalize", output)
            .input(clip.path())
            .copy_streams()
            .faststart()
            .expect_duration(clip.duration);
        self.backend.run(&cmd).await?;

        match self.backend.probe(output).await {
            Ok(info) => Ok(FinalVideo {
                duration: info.duration,
                size: info.size,
            }),
            Err(e) => {
                warn!(error = %e, "Could not probe final video, reporting planned duration");
                Ok(FinalVideo {
                    duration: clip.duration,
                    size: file_size(output).await?,
                })
            }
        }
    }

    async fn keep_artifacts(&self, paths: &[PathBuf], dir: &Path, project_id: &str) {
        let dir = dir.join(project_id);
        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match persist_artifact(path, &dir, name).await {
                Ok(kept) => info!(path = %kept.display(), "Artifact kept"),
                Err(e) => warn!(file = name, error = %e, "Could not keep artifact"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use vcomp_media::testing::FakeBackend;
    use vcomp_models::{Caption, OutputFormat, Scene};
    use vcomp_storage::testing::MemoryBlobStore;
    use vcomp_storage::NullBlobStore;

    fn request(format: OutputFormat, captions: Vec<Caption>) -> ProjectRequest {
        let mut request = ProjectRequest::new(
            "p1",
            vec![Scene::new("a", 4.0).with_video("https://cdn.example.com/a.mp4")],
        );
        request.output_format = format;
        request.captions = captions;
        request
    }

    fn timeline(request: &ProjectRequest) -> BundleTimeline<'_> {
        BundleTimeline {
            project_id: &request.project_id,
            name: &request.project_name,
            width: 1920,
            height: 1080,
            fps: 30,
            duration: 4.0,
            visuals: Vec::new(),
            audios: Vec::new(),
            captions: &request.captions,
            caption_style: None,
        }
    }

    async fn composed(dir: &Path) -> Clip {
        let path = dir.join("mixed.mp4");
        fs::write(&path, b"composed").await.unwrap();
        Clip::new(path, 4.0)
    }

    #[tokio::test]
    async fn test_inline_export_without_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new();
        let request = request(OutputFormat::Both, vec![Caption::new("hi", 0.0, 1.0)]);
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &NullBlobStore, dir.path(), None);
        let result = exporter
            .export(&request, clip, Some(timeline(&request)))
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.duration, Some(4.0));
        assert!(result.video_url.is_none());
        let video = BASE64.decode(result.video_base64.unwrap()).unwrap();
        assert_eq!(video, b"fake finalize output");
        assert!(result.draft_base64.is_some());
        assert!(result.srt_content.unwrap().starts_with("1\n00:00:00,000 --> 00:00:01,000"));
        assert!(result.srt_url.is_none());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_urls_with_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new();
        let store = MemoryBlobStore::new();
        let request = request(OutputFormat::Both, vec![Caption::new("hi", 0.0, 1.0)]);
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &store, dir.path(), None);
        let result = exporter
            .export(&request, clip, Some(timeline(&request)))
            .await
            .unwrap();

        assert_eq!(result.video_url.as_deref(), Some("memory://compositions/p1/final.mp4"));
        assert_eq!(result.draft_url.as_deref(), Some("memory://compositions/p1/project_bundle.zip"));
        assert_eq!(result.srt_url.as_deref(), Some("memory://compositions/p1/captions.srt"));
        assert!(result.srt_content.is_some());
        assert!(result.video_base64.is_none());
    }

    #[tokio::test]
    async fn test_video_only_without_captions() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new();
        let store = MemoryBlobStore::new();
        let request = request(OutputFormat::Video, Vec::new());
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &store, dir.path(), None);
        let result = exporter
            .export(&request, clip, Some(timeline(&request)))
            .await
            .unwrap();

        assert!(result.video_url.is_some());
        assert!(result.draft_url.is_none() && result.draft_base64.is_none());
        assert!(result.srt_content.is_none());
        assert_eq!(store.keys(), vec!["compositions/p1/final.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_artifacts_are_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let keep = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new();
        let request = request(OutputFormat::Video, Vec::new());
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &NullBlobStore, dir.path(), Some(keep.path()));
        exporter.export(&request, clip, None).await.unwrap();

        assert!(keep.path().join("p1").join(VIDEO_OBJECT).exists());
    }

    #[tokio::test]
    async fn test_prepare_uploads_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new();
        let store = MemoryBlobStore::new();
        let request = request(OutputFormat::Both, vec![Caption::new("hi", 0.0, 1.0)]);
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &store, dir.path(), None);
        let prepared = exporter
            .prepare(&request, clip, Some(timeline(&request)))
            .await
            .unwrap();
        assert!(store.keys().is_empty());
        assert!(dir.path().join(VIDEO_OBJECT).exists());
        assert!(dir.path().join(BUNDLE_OBJECT).exists());
        assert!(dir.path().join(TRANSCRIPT_OBJECT).exists());

        let result = exporter.deliver(&request, prepared).await.unwrap();
        assert_eq!(store.keys().len(), 3);
        assert_eq!(result.duration, Some(4.0));
        assert!(result.srt_content.is_some());
    }

    #[tokio::test]
    async fn test_finalize_failure_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = FakeBackend::new().fail_label("finalize");
        let request = request(OutputFormat::Video, Vec::new());
        let clip = composed(dir.path()).await;

        let exporter = Exporter::new(&backend, &NullBlobStore, dir.path(), None);
        assert!(exporter.export(&request, clip, None).await.is_err());
    }
}
