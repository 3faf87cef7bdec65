//! Composition render worker.
//!
//! This crate provides:
//! - The render orchestrator and its stage state machine
//! - Export of the final video, transcript and project bundle
//! - Delivery by blob store URL or inline bytes
//! - Structured logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use config::RenderConfig;
pub use error::{PipelineResult, RenderError};
pub use logging::RenderLogger;
pub use pipeline::Renderer;
