//! Scene preparation.
//!
//! Fetching and normalizing each run scene-parallel up to a bound, and both
//! hand back their survivors in request order. A scene that fails either
//! step is dropped with a warning.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use vcomp_media::fetch::is_image_extension;
use vcomp_media::{
    apply_voiceovers, normalize_scene, Clip, MediaBackend, MediaFetcher, NormalizeOptions,
    VoiceTrack,
};
use vcomp_models::{FailureKind, RenderStage, RenderWarning, Scene};

use crate::error::{PipelineResult, RenderError};

/// Survivors of a phase plus the warnings for everything dropped.
#[derive(Debug)]
pub struct SceneBatch<T> {
    pub ready: Vec<T>,
    pub warnings: Vec<RenderWarning>,
}

/// A scene whose sources are on local disk.
#[derive(Debug, Clone)]
pub struct FetchedScene<'a> {
    /// Position in the request
    pub index: usize,
    pub scene: &'a Scene,
    pub source: PathBuf,
    pub is_image: bool,
    /// Parallel to `scene.voiceovers`; `None` where the fetch failed
    pub voice_files: Vec<Option<PathBuf>>,
}

impl FetchedScene<'_> {
    fn voice_tracks(&self) -> Vec<VoiceTrack> {
        self.scene
            .voiceovers
            .iter()
            .zip(&self.voice_files)
            .filter_map(|(vo, file)| {
                file.as_ref().map(|path| VoiceTrack {
                    path: path.clone(),
                    start_offset: vo.start_offset,
                    volume: vo.volume,
                })
            })
            .collect()
    }
}

/// A scene normalized to the project format.
#[derive(Debug, Clone)]
pub struct PreparedScene<'a> {
    pub fetched: FetchedScene<'a>,
    pub clip: Clip,
}

impl PreparedScene<'_> {
    pub fn scene(&self) -> &Scene {
        self.fetched.scene
    }
}

type SceneOutcome<T> = Result<(T, Vec<RenderWarning>), RenderWarning>;

fn gather<T>(results: Vec<PipelineResult<SceneOutcome<T>>>) -> PipelineResult<SceneBatch<T>> {
    let mut batch = SceneBatch {
        ready: Vec::with_capacity(results.len()),
        warnings: Vec::new(),
    };
    for result in results {
        match result? {
            Ok((item, warnings)) => {
                batch.ready.push(item);
                batch.warnings.extend(warnings);
            }
            Err(dropped) => batch.warnings.push(dropped),
        }
    }
    Ok(batch)
}

/// Fetch every scene's visual source and voiceovers.
pub async fn fetch_scenes<'a>(
    fetcher: &MediaFetcher,
    scenes: &'a [Scene],
    work_dir: &Path,
    parallel: usize,
) -> PipelineResult<SceneBatch<FetchedScene<'a>>> {
    let semaphore = Semaphore::new(parallel.max(1));

    let futures: Vec<_> = scenes
        .iter()
        .enumerate()
        .map(|(index, scene)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| RenderError::internal("scene fetch semaphore closed"))?;
                Ok(fetch_scene(fetcher, index, scene, work_dir).await)
            }
        })
        .collect();

    gather(join_all(futures).await)
}

async fn fetch_scene<'a>(
    fetcher: &MediaFetcher,
    index: usize,
    scene: &'a Scene,
    work_dir: &Path,
) -> SceneOutcome<FetchedScene<'a>> {
    let dropped = |message: String| {
        RenderWarning::new(RenderStage::Fetching, FailureKind::SourceUnavailable, message)
            .for_scene(scene.id.clone())
    };

    let visual = scene
        .visual_source()
        .ok_or_else(|| dropped("scene has no visual source".to_string()))?;

    let stem = work_dir.join(format!("scene_{:03}_source", index));
    let source = fetcher.fetch(visual.reference(), &stem).await.map_err(|e| {
        warn!(scene_id = %scene.id, error = %e, "Dropping scene, source unavailable");
        dropped(format!("scene dropped: {}", e))
    })?;

    let sniffed_image = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_image_extension);
    let is_image = visual.is_image() || sniffed_image;

    let mut warnings = Vec::new();
    let mut voice_files = Vec::with_capacity(scene.voiceovers.len());
    for (i, voiceover) in scene.voiceovers.iter().enumerate() {
        let stem = work_dir.join(format!("scene_{:03}_voice_{:02}", index, i));
        match fetcher.fetch(&voiceover.audio_url, &stem).await {
            Ok(path) => voice_files.push(Some(path)),
            Err(e) => {
                warn!(scene_id = %scene.id, voiceover = i, error = %e, "Skipping voiceover");
                warnings.push(
                    RenderWarning::new(
                        RenderStage::Fetching,
                        FailureKind::SourceUnavailable,
                        format!("voiceover {} omitted: {}", i, e),
                    )
                    .for_scene(scene.id.clone()),
                );
                voice_files.push(None);
            }
        }
    }

    debug!(scene_id = %scene.id, source = %source.display(), is_image, "Scene fetched");
    Ok((
        FetchedScene {
            index,
            scene,
            source,
            is_image,
            voice_files,
        },
        warnings,
    ))
}

/// Normalize fetched scenes and apply their voiceovers.
pub async fn normalize_scenes<'a>(
    backend: &dyn MediaBackend,
    fetched: Vec<FetchedScene<'a>>,
    work_dir: &Path,
    opts: &NormalizeOptions,
    parallel: usize,
) -> PipelineResult<SceneBatch<PreparedScene<'a>>> {
    let semaphore = Semaphore::new(parallel.max(1));

    let futures: Vec<_> = fetched
        .into_iter()
        .map(|scene| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| RenderError::internal("normalize semaphore closed"))?;
                Ok(normalize_one(backend, scene, work_dir, opts).await)
            }
        })
        .collect();

    gather(join_all(futures).await)
}

async fn normalize_one<'a>(
    backend: &dyn MediaBackend,
    fetched: FetchedScene<'a>,
    work_dir: &Path,
    opts: &NormalizeOptions,
) -> SceneOutcome<PreparedScene<'a>> {
    let scene = fetched.scene;
    let output = work_dir.join(format!("scene_{:03}.mp4", fetched.index));

    let clip = normalize_scene(
        backend,
        &fetched.source,
        fetched.is_image,
        &output,
        scene.duration,
        opts,
    )
    .await
    .map_err(|e| {
        warn!(scene_id = %scene.id, error = %e, "Dropping scene, normalization failed");
        RenderWarning::new(
            RenderStage::Normalizing,
            FailureKind::SourceUnavailable,
            format!("scene dropped: {}", e),
        )
        .for_scene(scene.id.clone())
    })?;

    let tracks = fetched.voice_tracks();
    let mixed_output = work_dir.join(format!("scene_{:03}_audio.mp4", fetched.index));
    let mut warnings = Vec::new();
    let clip = match apply_voiceovers(
        backend,
        clip.clone(),
        &tracks,
        scene.strip_original_audio,
        &mixed_output,
        &opts.encoding,
    )
    .await
    {
        Ok(mixed) => mixed,
        Err(e) => {
            warn!(scene_id = %scene.id, error = %e, "Voiceover mixing failed");
            warnings.push(overlay_warning(scene, format!("voiceovers omitted: {}", e)));
            if scene.strip_original_audio && !tracks.is_empty() {
                strip_audio(backend, scene, clip, fetched.index, work_dir, opts, &mut warnings).await
            } else {
                clip
            }
        }
    };

    Ok((PreparedScene { fetched, clip }, warnings))
}

fn overlay_warning(scene: &Scene, message: String) -> RenderWarning {
    RenderWarning::new(RenderStage::Normalizing, FailureKind::OverlayFailed, message)
        .for_scene(scene.id.clone())
}

/// Swap a scene's audio for silence after its voiceovers were dropped.
/// Keeps the clip as it is when that fails too.
async fn strip_audio(
    backend: &dyn MediaBackend,
    scene: &Scene,
    clip: Clip,
    index: usize,
    work_dir: &Path,
    opts: &NormalizeOptions,
    warnings: &mut Vec<RenderWarning>,
) -> Clip {
    let output = work_dir.join(format!("scene_{:03}_silent.mp4", index));
    match apply_voiceovers(backend, clip.clone(), &[], true, &output, &opts.encoding).await {
        Ok(silent) => silent,
        Err(e) => {
            warn!(scene_id = %scene.id, error = %e, "Could not strip scene audio");
            warnings.push(overlay_warning(scene, format!("original audio kept: {}", e)));
            clip
        }
    }
}
