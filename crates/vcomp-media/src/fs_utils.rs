//! Moving render artifacts out of the scratch directory.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move `src` to `dst`, creating parent directories and copying when the two
/// paths live on different filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !fs::try_exists(src).await? {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Move an artifact into `dir` under `name`, returning its new path.
pub async fn persist_artifact(src: &Path, dir: &Path, name: &str) -> MediaResult<PathBuf> {
    let dst = dir.join(name);
    move_file(src, &dst).await?;
    Ok(dst)
}

/// Size of a file in bytes.
pub async fn file_size(path: &Path) -> MediaResult<u64> {
    Ok(fs::metadata(path).await?.len())
}

// EXDEV
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    // Land next to the destination first so the final rename is atomic
    let staging = dst.with_extension("partial");
    fs::copy(src, &staging).await?;

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Could not remove moved artifact source");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("final.mp4");
        fs::write(&src, b"video").await.unwrap();

        let out = persist_artifact(&src, &dir.path().join("out/renders"), "film.mp4")
            .await
            .unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&out).await.unwrap(), b"video");
        assert_eq!(file_size(&out).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_move_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.srt");
        let dst = dir.path().join("b.srt");
        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = move_file(dir.path().join("nope"), dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_cross_device_detection() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(2)));
    }
}
