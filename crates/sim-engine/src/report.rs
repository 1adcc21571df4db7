//! Structured session events.
//!
//! The runner narrates the run through a [`SessionObserver`]; renderers
//! (verbose log, graph log) live with the caller. Records carry everything
//! the original per-segment log lines printed, including the truncated
//! values of a download cut short by a seek.

use crate::metrics::SessionSummary;
use crate::network::DownloadProgress;

/// One download cycle, as observed after buffer depletion.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub segment: usize,
    /// Play time when the download was issued, rounded for display.
    pub start_time: f64,
    /// Play time when the cycle settled (the seek instant for truncated
    /// cycles), rounded for display.
    pub end_time: f64,
    pub progress: DownloadProgress,
    /// Ladder bitrate of the downloaded quality, bits/ms.
    pub bitrate: f64,
    pub replacement: bool,
    /// True when a seek interrupted depletion: the download was discarded,
    /// no buffer update and no throughput sample happened.
    pub interrupted: bool,
    /// Downloaded bits as displayed: scaled by elapsed/total for truncated
    /// cycles, the real count otherwise.
    pub downloaded_effective: f64,
    /// Wall time as displayed: truncated at the seek instant when
    /// interrupted.
    pub time_effective: f64,
    pub buffer_level_before: f64,
    pub buffer_level_after: f64,
    /// Conditions of the network period current at emission time.
    pub bandwidth: f64,
    pub latency: f64,
    /// Rebuffer attributed to this cycle (zero for truncated cycles).
    pub rebuffer_time: f64,
    /// Hybrid-strategy mode flag at emission time.
    pub buffer_mode: bool,
}

/// A consumed seek event.
#[derive(Debug, Clone, Copy)]
pub struct SeekRecord {
    /// Play time at which the seek fired, ms.
    pub play_time: f64,
    /// Requested target position, seconds.
    pub seek_to: f64,
    /// Segment index playback resumed at.
    pub new_segment: usize,
}

/// Which rule imposed a pre-download delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// The buffer would overflow `max_buffer` with one more segment.
    FullBuffer,
    /// The strategy asked for a pause.
    Abr,
}

/// Receiver for session events. All methods default to no-ops.
pub trait SessionObserver {
    fn on_startup(&mut self, _record: &DownloadRecord) {}

    fn on_download(&mut self, _record: &DownloadRecord) {}

    fn on_seek(&mut self, _record: &SeekRecord) {}

    fn on_delay(&mut self, _kind: DelayKind, _delay: f64, _buffer_level: f64) {}

    fn on_summary(&mut self, _summary: &SessionSummary) {}
}

/// Observer that ignores everything (headless runs and tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
