//! Blob store abstraction and artifact naming.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Object name of the final video under a project prefix.
pub const VIDEO_OBJECT: &str = "final.mp4";
/// Object name of the project bundle under a project prefix.
pub const BUNDLE_OBJECT: &str = "project_bundle.zip";
/// Object name of the transcript under a project prefix.
pub const TRANSCRIPT_OBJECT: &str = "captions.srt";

const KEY_ROOT: &str = "compositions";

/// Destination for rendered artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under `key`, returning its public URL.
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String>;

    /// Whether uploads can succeed at all. Artifacts are returned inline
    /// when this is false.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Store used when a request carries no credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBlobStore;

#[async_trait]
impl BlobStore for NullBlobStore {
    async fn upload(&self, _path: &Path, _key: &str) -> StorageResult<String> {
        Err(StorageError::NotConfigured)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Object key for an artifact of a project.
pub fn artifact_key(project_id: &str, object: &str) -> StorageResult<String> {
    let id = project_id.trim();
    if id.is_empty() || id.contains('/') || id.contains("..") {
        return Err(StorageError::InvalidKey(format!(
            "project id '{}' cannot be used as a key prefix",
            project_id
        )));
    }
    Ok(format!("{}/{}/{}", KEY_ROOT, id, object))
}

/// Content type for an artifact, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("zip") => "application/zip",
        Some("srt") => "application/x-subrip",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_keys() {
        assert_eq!(
            artifact_key("proj-1", VIDEO_OBJECT).unwrap(),
            "compositions/proj-1/final.mp4"
        );
        assert_eq!(
            artifact_key("proj-1", BUNDLE_OBJECT).unwrap(),
            "compositions/proj-1/project_bundle.zip"
        );
        assert!(artifact_key("../etc", VIDEO_OBJECT).is_err());
        assert!(artifact_key("a/b", VIDEO_OBJECT).is_err());
        assert!(artifact_key("  ", VIDEO_OBJECT).is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("final.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("b.zip")), "application/zip");
        assert_eq!(content_type_for(Path::new("c.srt")), "application/x-subrip");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_null_store_refuses() {
        let store = NullBlobStore;
        assert!(!store.is_enabled());
        let err = store.upload(Path::new("x.mp4"), "k").await.unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));
    }
}
