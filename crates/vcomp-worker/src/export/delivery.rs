//! Artifact delivery: blob store URL, or inline bytes.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::fs;
use tracing::{info, warn};

use vcomp_models::{FailureKind, RenderStage, RenderWarning};
use vcomp_storage::{artifact_key, BlobStore};

use crate::error::PipelineResult;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    Url(String),
    /// Base64 of the file
    Inline(String),
}

impl Delivered {
    /// Split into the `(url, base64)` pair of the result.
    pub fn into_fields(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Url(url) => (Some(url), None),
            Self::Inline(data) => (None, Some(data)),
        }
    }
}

/// Upload `path` when the store is enabled, otherwise or on failure return
/// it inline. A failed upload yields a warning.
pub async fn deliver(
    store: &dyn BlobStore,
    path: &Path,
    project_id: &str,
    object: &str,
) -> PipelineResult<(Delivered, Option<RenderWarning>)> {
    if store.is_enabled() {
        match upload(store, path, project_id, object).await {
            Ok(url) => return Ok((Delivered::Url(url), None)),
            Err(message) => {
                warn!(object, error = %message, "Upload failed, returning artifact inline");
                let warning = RenderWarning::new(
                    RenderStage::Exporting,
                    FailureKind::UploadFailed,
                    format!("{} returned inline: {}", object, message),
                );
                return Ok((inline(path).await?, Some(warning)));
            }
        }
    }
    Ok((inline(path).await?, None))
}

/// Upload an artifact that is always returned inline by other means, such
/// as the transcript text. `None` without a store or on failure.
pub async fn upload_copy(
    store: &dyn BlobStore,
    path: &Path,
    project_id: &str,
    object: &str,
) -> (Option<String>, Option<RenderWarning>) {
    if !store.is_enabled() {
        return (None, None);
    }
    match upload(store, path, project_id, object).await {
        Ok(url) => (Some(url), None),
        Err(message) => {
            warn!(object, error = %message, "Upload failed, artifact stays inline only");
            let warning = RenderWarning::new(
                RenderStage::Exporting,
                FailureKind::UploadFailed,
                format!("{} not uploaded: {}", object, message),
            );
            (None, Some(warning))
        }
    }
}

async fn upload(
    store: &dyn BlobStore,
    path: &Path,
    project_id: &str,
    object: &str,
) -> Result<String, String> {
    let key = artifact_key(project_id, object).map_err(|e| e.to_string())?;
    let url = store.upload(path, &key).await.map_err(|e| e.to_string())?;
    info!(key = %key, "Artifact delivered by URL");
    Ok(url)
}

async fn inline(path: &Path) -> PipelineResult<Delivered> {
    let bytes = fs::read(path).await?;
    Ok(Delivered::Inline(BASE64.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcomp_storage::testing::MemoryBlobStore;
    use vcomp_storage::{NullBlobStore, VIDEO_OBJECT};

    async fn artifact(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("final.mp4");
        fs::write(&path, b"movie").await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_inline_without_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = artifact(&dir).await;
        let (delivered, warning) = deliver(&NullBlobStore, &path, "p1", VIDEO_OBJECT)
            .await
            .unwrap();
        assert_eq!(delivered, Delivered::Inline(BASE64.encode(b"movie")));
        assert!(warning.is_none());
    }

    #[tokio::test]
    async fn test_url_with_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = artifact(&dir).await;
        let store = MemoryBlobStore::new();
        let (delivered, warning) = deliver(&store, &path, "p1", VIDEO_OBJECT).await.unwrap();
        assert_eq!(
            delivered,
            Delivered::Url("memory://compositions/p1/final.mp4".to_string())
        );
        assert!(warning.is_none());
        assert_eq!(store.object("compositions/p1/final.mp4"), Some(b"movie".to_vec()));
    }

    #[tokio::test]
    async fn test_failed_upload_falls_back_inline() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = artifact(&dir).await;
        let (delivered, warning) = deliver(&MemoryBlobStore::failing(), &path, "p1", VIDEO_OBJECT)
            .await
            .unwrap();
        assert!(matches!(delivered, Delivered::Inline(_)));
        assert_eq!(warning.unwrap().kind, FailureKind::UploadFailed);
    }
}
