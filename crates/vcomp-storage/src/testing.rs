//! In-memory [`BlobStore`] for tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Keeps uploaded bytes by key. Can be told to reject or stall every upload.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
    delay: Option<Duration>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose uploads always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// A store that waits `delay` before accepting each upload.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Keys uploaded so far, in order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, bytes)| bytes.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, Vec<u8>)>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String> {
        if self.fail {
            return Err(StorageError::upload_failed(format!("{}: bucket unreachable", key)));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let bytes = tokio::fs::read(path).await?;
        self.lock().push((key.to_string(), bytes));
        Ok(format!("memory://{}", key))
    }
}
