//! Strategy seams: the `Abr` and `Replacement` traits and the read-only
//! session view they observe.
//!
//! Strategies never touch session state directly. Every callback receives a
//! [`SessionView`] carrying the manifest, the buffer and the current
//! throughput/latency estimates; the runner owns everything mutable.

use crate::buffer::PlaybackBuffer;
use crate::manifest::Manifest;
use crate::network::{Abandon, DownloadProgress};

/// Immutable snapshot of the session, handed to strategy callbacks.
#[derive(Clone, Copy)]
pub struct SessionView<'a> {
    pub manifest: &'a Manifest,
    pub buffer: &'a PlaybackBuffer,
    pub throughput: Option<f64>,
    pub latency: Option<f64>,
}

impl SessionView<'_> {
    pub fn buffer_level(&self) -> f64 {
        self.buffer.level()
    }

    /// Highest quality whose next-level download still fits within one
    /// playout interval at throughput `tput`, given the current latency.
    ///
    /// A zero or unknown throughput yields quality 0: the fit test divides
    /// by `tput`, so the candidate cost becomes infinite.
    pub fn quality_from_throughput(&self, tput: f64) -> usize {
        let p = self.manifest.segment_time;
        let latency = self.latency.unwrap_or(0.0);
        let bitrates = &self.manifest.bitrates;
        let mut quality = 0;
        while quality + 1 < bitrates.len() && latency + p * bitrates[quality + 1] / tput <= p {
            quality += 1;
        }
        quality
    }
}

/// An adaptive bitrate decision strategy.
///
/// The runner calls `quality_delay` before each segment download, delivers
/// lifecycle notifications through the `report_*` methods, and gives
/// `check_abandon` a chance to abort the in-flight download at every network
/// progress checkpoint.
pub trait Abr {
    /// Quality for the very first (startup) segment.
    fn first_quality(&self, _view: &SessionView<'_>) -> usize {
        0
    }

    /// Quality and optional pre-download delay (ms) for `segment_index`.
    fn quality_delay(&mut self, view: &SessionView<'_>, segment_index: usize) -> (usize, f64);

    /// The runner imposed a network delay (full buffer or strategy ask).
    fn report_delay(&mut self, _view: &SessionView<'_>, _delay: f64) {}

    /// A download finished (possibly abandoned, possibly a replacement).
    fn report_download(
        &mut self,
        _view: &SessionView<'_>,
        _progress: &DownloadProgress,
        _is_replacement: bool,
    ) {
    }

    /// The user sought to `where_ms` (playback position, ms).
    fn report_seek(&mut self, _view: &SessionView<'_>, _where_ms: f64) {}

    /// Offered at every download checkpoint; return a lower quality to
    /// abort the transfer and re-download at that level.
    fn check_abandon(
        &mut self,
        _view: &SessionView<'_>,
        _progress: &DownloadProgress,
        _buffer_level: f64,
    ) -> Option<usize> {
        None
    }

    /// Whether the strategy is currently driving decisions off the buffer
    /// (hybrid strategies report their mode flag; pure ones say no).
    fn buffer_mode_active(&self) -> bool {
        false
    }
}

/// A segment replacement policy: may redirect the next download at an
/// already-buffered slot to upgrade its quality.
pub trait Replacement {
    /// Negative offset (relative to the buffer end) of the first slot worth
    /// re-downloading at `quality`, or `None`.
    fn check_replace(&mut self, view: &SessionView<'_>, quality: usize) -> Option<isize>;

    /// Abort the in-flight replacement when playback has caught up with the
    /// slot being replaced.
    fn check_abandon(
        &mut self,
        _view: &SessionView<'_>,
        _progress: &DownloadProgress,
        _buffer_level: f64,
    ) -> Option<Abandon> {
        None
    }

    fn report_seek(&mut self, _view: &SessionView<'_>, _where_ms: f64) {}
}
