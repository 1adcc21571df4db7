//! # sim-engine
//!
//! Discrete-event engine for simulating adaptive bitrate (ABR) video
//! streaming sessions. Given a segmented video manifest, a cyclic network
//! trace and a schedule of user seeks, the engine drives the closed loop
//! between the playback buffer, the bandwidth-constrained network model and
//! a pluggable ABR strategy, and accumulates quality-of-experience metrics.
//!
//! The engine is single-threaded and deterministic: the network clock and
//! the playback clock advance in lockstep under the session runner, so every
//! strategy callback observes a consistent snapshot of the session.
//!
//! Key pieces:
//!
//! - [`Manifest`] / [`NetworkTrace`] / [`SeekQueue`] — immutable run inputs
//! - [`NetworkModel`] — exact bit/ms accounting with abandonment checkpoints
//! - [`ThroughputHistory`] — conservative throughput/latency estimators
//! - [`Abr`] / [`Replacement`] — strategy seams, fed a read-only
//!   [`SessionView`]
//! - [`SessionRunner`] — the per-segment download loop and metric sink

use thiserror::Error;

pub mod abr;
pub mod buffer;
pub mod estimator;
pub mod manifest;
pub mod metrics;
pub mod network;
pub mod reaction;
pub mod report;
pub mod seek;
pub mod session;
pub mod trace;

pub use abr::{Abr, Replacement, SessionView};
pub use buffer::{BufferEntry, PlaybackBuffer};
pub use estimator::{Ewma, SlidingWindow, ThroughputHistory};
pub use manifest::{Manifest, ManifestSource};
pub use metrics::{Metrics, SessionSummary};
pub use network::{
    Abandon, DownloadProgress, NetworkModel, ProgressThresholds, SustainableShift,
};
pub use report::{DelayKind, DownloadRecord, NullObserver, SeekRecord, SessionObserver};
pub use seek::{SeekEvent, SeekQueue, SeekScheduleSource};
pub use session::{SessionConfig, SessionRunner};
pub use trace::{NetworkPeriod, NetworkTrace, PeriodSource};

/// Configuration-time errors: malformed or inconsistent run inputs.
///
/// All variants are raised before any simulation work happens; the engine
/// itself does not fail mid-run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("invalid network trace: {reason}")]
    InvalidTrace { reason: String },

    #[error("invalid seek schedule: {reason}")]
    InvalidSeekSchedule { reason: String },
}
