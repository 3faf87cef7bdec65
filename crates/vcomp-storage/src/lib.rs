//! Storage for rendered artifacts.
//!
//! This crate provides:
//! - The [`BlobStore`] seam the exporter uploads through
//! - An S3-compatible implementation built from request credentials
//! - Artifact key and content type conventions

pub mod client;
pub mod error;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::{
    artifact_key, content_type_for, BlobStore, NullBlobStore, BUNDLE_OBJECT, TRANSCRIPT_OBJECT,
    VIDEO_OBJECT,
};
