//! FFmpeg CLI wrapper and composition stages.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with a typed filter graph
//! - Progress parsing from `-progress pipe:2` and per-invocation timeouts
//! - Source fetching (HTTP, data URIs, raw base64)
//! - The stages of a composition: normalize, voiceover, sequence, captions, music
//!
//! Stages talk to ffmpeg through [`MediaBackend`] so they can run against a
//! fake in tests.

pub mod backend;
pub mod captions;
pub mod clip;
pub mod command;
pub mod error;
pub mod fetch;
pub mod filter_graph;
pub mod fs_utils;
pub mod music;
pub mod normalize;
pub mod probe;
pub mod progress;
pub mod sequencer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod voiceover;

pub use backend::{FfmpegBackend, MediaBackend};
pub use captions::{burn_captions, CaptionCanvas};
pub use clip::{Clip, StageOutcome};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fetch::{MediaFetcher, MediaSource};
pub use filter_graph::{Filter, FilterChain, FilterGraph};
pub use music::{mix_music, MusicBed};
pub use normalize::{normalize_scene, NormalizeOptions};
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use sequencer::{Sequenced, Sequencer};
pub use voiceover::{apply_voiceovers, VoiceTrack};
