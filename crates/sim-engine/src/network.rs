//! Bandwidth-constrained network model.
//!
//! The model consumes bits and wall time against the cyclic trace with
//! exact bit/ms accounting. Within a period of `(duration, bandwidth,
//! latency)` one "latency delay" costs `1 * latency` ms and transferring
//! `n` bits costs `n / bandwidth` ms; a zero-bandwidth period accumulates
//! time without progress. Transfers crossing a period boundary advance to
//! the boundary exactly, step the cursor (wrapping at the end of the
//! trace) and continue.
//!
//! Downloads can run with progress checkpoints: after every
//! `min_progress_size` bits or `min_progress_time` ms the abandonment
//! callback may abort the transfer. At least one full latency delay is
//! charged before the first checkpoint, and the callback never sees a
//! completed transfer.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::manifest::Manifest;
use crate::trace::NetworkTrace;

/// Why an in-flight download was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandon {
    /// Downshift: rewind and re-download the same segment at this quality.
    ToQuality(usize),
    /// A replacement download lost its race with playback; discard it.
    TooLate,
}

/// Outcome of a (possibly partial) download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub index: usize,
    pub quality: usize,
    pub size: f64,
    pub downloaded: f64,
    pub time: f64,
    pub time_to_first_bit: f64,
    pub abandon: Option<Abandon>,
}

impl DownloadProgress {
    pub fn is_abandoned(&self) -> bool {
        self.abandon.is_some()
    }

    /// The downshift target, when the abort asked for one.
    pub fn abandon_to_quality(&self) -> Option<usize> {
        match self.abandon {
            Some(Abandon::ToQuality(q)) => Some(q),
            _ => None,
        }
    }
}

/// Checkpoint thresholds for abandonable downloads.
#[derive(Debug, Clone, Copy)]
pub struct ProgressThresholds {
    pub min_size: f64,
    pub min_time: f64,
}

impl Default for ProgressThresholds {
    fn default() -> Self {
        Self {
            min_size: 12_000.0,
            min_time: 50.0,
        }
    }
}

/// A change of the highest sustainable quality, recorded on period entry.
///
/// The runner drains these after every network call and feeds them to the
/// reaction-time tracker; the buffer cannot change while the network clock
/// advances, so draining late is observably identical to an in-line
/// notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SustainableShift {
    pub at: f64,
    pub quality: usize,
    pub previous: usize,
}

/// Abandonment callback: `(progress so far, remaining buffer level)` to an
/// optional abort decision.
pub type AbandonCheck<'a> = dyn FnMut(&DownloadProgress, f64) -> Option<Abandon> + 'a;

pub struct NetworkModel {
    manifest: Arc<Manifest>,
    trace: NetworkTrace,
    index: usize,
    time_to_next: f64,
    total_time: f64,
    sustainable_quality: usize,
    shifts: VecDeque<SustainableShift>,
    thresholds: ProgressThresholds,
}

impl NetworkModel {
    pub fn new(trace: NetworkTrace, manifest: Arc<Manifest>, thresholds: ProgressThresholds) -> Self {
        let mut model = Self {
            manifest,
            trace,
            index: 0,
            time_to_next: 0.0,
            total_time: 0.0,
            sustainable_quality: 0,
            shifts: VecDeque::new(),
            thresholds,
        };
        model.begin_period(0);
        model
    }

    /// Total virtual network time consumed so far.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Highest quality the current period can sustain, net of latency.
    pub fn sustainable_quality(&self) -> usize {
        self.sustainable_quality
    }

    /// Bandwidth and latency of the current period.
    pub fn current_conditions(&self) -> (f64, f64) {
        let p = self.trace.period(self.index);
        (p.bandwidth, p.latency)
    }

    pub fn pop_shift(&mut self) -> Option<SustainableShift> {
        self.shifts.pop_front()
    }

    fn advance_period(&mut self) {
        let next = if self.index + 1 == self.trace.len() {
            0
        } else {
            self.index + 1
        };
        self.begin_period(next);
    }

    fn begin_period(&mut self, index: usize) {
        self.index = index;
        let period = *self.trace.period(index);
        self.time_to_next = period.duration;

        let latency_factor = 1.0 - period.latency / self.manifest.segment_time;
        let effective_bandwidth = period.bandwidth * latency_factor;
        let previous = self.sustainable_quality;
        let mut sustainable = 0;
        for (i, &bitrate) in self.manifest.bitrates.iter().enumerate().skip(1) {
            if bitrate > effective_bandwidth {
                break;
            }
            sustainable = i;
        }
        self.sustainable_quality = sustainable;
        if sustainable != previous {
            self.shifts.push_back(SustainableShift {
                at: self.total_time,
                quality: sustainable,
                previous,
            });
        }
        debug!(
            time = self.total_time,
            bandwidth = period.bandwidth,
            latency = period.latency,
            sustainable_quality = sustainable,
            "network period"
        );
    }

    /// Charge `delay_units` latency delays, crossing periods as needed.
    fn latency_delay(&mut self, mut delay_units: f64) -> f64 {
        let mut total_delay = 0.0;
        while delay_units > 0.0 {
            let current_latency = self.trace.period(self.index).latency;
            let time = delay_units * current_latency;
            if time <= self.time_to_next {
                total_delay += time;
                self.total_time += time;
                self.time_to_next -= time;
                delay_units = 0.0;
            } else {
                // time > time_to_next implies current_latency > 0
                total_delay += self.time_to_next;
                self.total_time += self.time_to_next;
                delay_units -= self.time_to_next / current_latency;
                self.advance_period();
            }
        }
        total_delay
    }

    /// Transfer `size` bits to completion, returning the wall time spent.
    fn transfer(&mut self, mut size: f64) -> f64 {
        let mut total_time = 0.0;
        while size > 0.0 {
            let current_bandwidth = self.trace.period(self.index).bandwidth;
            if size <= self.time_to_next * current_bandwidth {
                // current_bandwidth > 0
                let time = size / current_bandwidth;
                total_time += time;
                self.total_time += time;
                self.time_to_next -= time;
                size = 0.0;
            } else {
                total_time += self.time_to_next;
                self.total_time += self.time_to_next;
                size -= self.time_to_next * current_bandwidth;
                self.advance_period();
            }
        }
        total_time
    }

    /// Charge latency delays bounded by `min_time`. Returns the units and
    /// wall time actually consumed.
    fn bounded_latency_delay(&mut self, mut delay_units: f64, mut min_time: f64) -> (f64, f64) {
        let mut total_units = 0.0;
        let mut total_time = 0.0;
        while delay_units > 0.0 && min_time > 0.0 {
            let current_latency = self.trace.period(self.index).latency;
            let full_time = delay_units * current_latency;
            let (units, time) = if full_time <= min_time && full_time <= self.time_to_next {
                self.time_to_next -= full_time;
                self.total_time += full_time;
                (delay_units, full_time)
            } else if min_time <= self.time_to_next {
                // full_time > 0 implies current_latency > 0
                let time = min_time;
                let units = time / current_latency;
                self.time_to_next -= time;
                self.total_time += time;
                (units, time)
            } else {
                let time = self.time_to_next;
                let units = time / current_latency;
                self.total_time += time;
                self.advance_period();
                (units, time)
            };
            total_units += units;
            total_time += time;
            delay_units -= units;
            min_time -= time;
        }
        (total_units, total_time)
    }

    /// Transfer bits bounded by `min_size`/`min_time` checkpoint budgets.
    /// Returns the bits and wall time actually consumed.
    fn bounded_transfer(&mut self, mut size: f64, mut min_size: f64, mut min_time: f64) -> (f64, f64) {
        let mut total_size = 0.0;
        let mut total_time = 0.0;
        while size > 0.0 && (min_size > 0.0 || min_time > 0.0) {
            let current_bandwidth = self.trace.period(self.index).bandwidth;
            let (bits, time) = if current_bandwidth > 0.0 {
                let min_bits = min_size.max(min_time * current_bandwidth);
                let bits_to_next = self.time_to_next * current_bandwidth;
                if size <= min_bits && size <= bits_to_next {
                    let bits = size;
                    let time = bits / current_bandwidth;
                    self.time_to_next -= time;
                    self.total_time += time;
                    (bits, time)
                } else if min_bits <= bits_to_next {
                    let bits = min_bits;
                    let time = bits / current_bandwidth;
                    // keep rounding error from looping forever
                    min_size = 0.0;
                    min_time = 0.0;
                    self.time_to_next -= time;
                    self.total_time += time;
                    (bits, time)
                } else {
                    let bits = bits_to_next;
                    let time = self.time_to_next;
                    self.total_time += time;
                    self.advance_period();
                    (bits, time)
                }
            } else if min_size > 0.0 || min_time > self.time_to_next {
                let time = self.time_to_next;
                self.total_time += time;
                self.advance_period();
                (0.0, time)
            } else {
                let time = min_time;
                self.time_to_next -= time;
                self.total_time += time;
                (0.0, time)
            };
            total_size += bits;
            total_time += time;
            size -= bits;
            min_size -= bits;
            min_time -= time;
        }
        (total_size, total_time)
    }

    /// Advance the network clock by `time` ms without downloading anything.
    pub fn delay(&mut self, mut time: f64) {
        while time > self.time_to_next {
            time -= self.time_to_next;
            self.total_time += self.time_to_next;
            self.advance_period();
        }
        self.time_to_next -= time;
        self.total_time += time;
    }

    /// Download `size` bits for `(index, quality)`.
    ///
    /// Without a callback the whole transfer runs to completion after a
    /// single latency delay. With a callback, the transfer pauses at every
    /// progress checkpoint and the callback may abort it; the partial time
    /// is billed but no data is delivered.
    pub fn download(
        &mut self,
        size: f64,
        index: usize,
        quality: usize,
        buffer_level: f64,
        mut check_abandon: Option<&mut AbandonCheck<'_>>,
    ) -> DownloadProgress {
        if size <= 0.0 {
            return DownloadProgress {
                index,
                quality,
                size: 0.0,
                downloaded: 0.0,
                time: 0.0,
                time_to_first_bit: 0.0,
                abandon: None,
            };
        }

        let checkpoints_off =
            check_abandon.is_none() || (self.thresholds.min_time <= 0.0 && self.thresholds.min_size <= 0.0);
        if checkpoints_off {
            let latency = self.latency_delay(1.0);
            let time = latency + self.transfer(size);
            return DownloadProgress {
                index,
                quality,
                size,
                downloaded: size,
                time,
                time_to_first_bit: latency,
                abandon: None,
            };
        }

        let mut total_download_time = 0.0;
        let mut total_download_size = 0.0;
        let mut min_time_to_progress = self.thresholds.min_time;
        let mut min_size_to_progress = self.thresholds.min_size;

        let mut latency = None;
        let mut delay_units = 1.0;
        if self.thresholds.min_size > 0.0 {
            let l = self.latency_delay(1.0);
            total_download_time += l;
            min_time_to_progress -= total_download_time;
            latency = Some(l);
            delay_units = 0.0;
        }

        let mut abandon = None;
        while total_download_size < size && abandon.is_none() {
            if delay_units > 0.0 {
                // only reachable when min_size is configured to zero
                let (units, time) = self.bounded_latency_delay(delay_units, min_time_to_progress);
                total_download_time += time;
                delay_units -= units;
                min_time_to_progress -= time;
                if delay_units <= 0.0 {
                    latency = Some(total_download_time);
                }
            }
            if delay_units <= 0.0 {
                let (bits, time) = self.bounded_transfer(
                    size - total_download_size,
                    min_size_to_progress,
                    min_time_to_progress,
                );
                total_download_time += time;
                total_download_size += bits;
            }

            if total_download_size < size {
                let progress = DownloadProgress {
                    index,
                    quality,
                    size,
                    downloaded: total_download_size,
                    time: total_download_time,
                    time_to_first_bit: latency.unwrap_or(total_download_time),
                    abandon: None,
                };
                if let Some(check) = check_abandon.as_mut() {
                    abandon = check(&progress, (buffer_level - total_download_time).max(0.0));
                }
                if let Some(decision) = abandon {
                    debug!(
                        segment = index,
                        quality,
                        ?decision,
                        downloaded = total_download_size,
                        size,
                        time = total_download_time,
                        "abandoning download"
                    );
                }
                min_time_to_progress = self.thresholds.min_time;
                min_size_to_progress = self.thresholds.min_size;
            }
        }

        DownloadProgress {
            index,
            quality,
            size,
            downloaded: total_download_size,
            time: total_download_time,
            time_to_first_bit: latency.unwrap_or(total_download_time),
            abandon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestSource;
    use crate::trace::PeriodSource;

    fn manifest(bitrates: Vec<f64>) -> Arc<Manifest> {
        let levels = bitrates.len();
        Arc::new(
            Manifest::new(
                ManifestSource {
                    segment_duration_ms: 1000.0,
                    bitrates_kbps: bitrates,
                    segment_sizes_bits: vec![vec![1000.0; levels]; 4],
                },
                None,
            )
            .unwrap(),
        )
    }

    fn trace(periods: &[(f64, f64, f64)]) -> NetworkTrace {
        NetworkTrace::new(
            periods
                .iter()
                .map(|&(duration_ms, bandwidth_kbps, latency_ms)| PeriodSource {
                    duration_ms,
                    bandwidth_kbps,
                    latency_ms,
                })
                .collect(),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn constant_trace_download_time_is_size_over_bandwidth_plus_latency() {
        let mut network = NetworkModel::new(
            trace(&[(1000.0, 1000.0, 100.0)]),
            manifest(vec![100.0, 200.0]),
            ProgressThresholds::default(),
        );
        let progress = network.download(1_000_000.0, 0, 0, 0.0, None);
        assert_eq!(progress.downloaded, 1_000_000.0);
        assert!((progress.time - (1_000_000.0 / 1000.0 + 100.0)).abs() < 1e-9);
        assert_eq!(progress.time_to_first_bit, 100.0);
        assert_eq!(progress.abandon, None);
    }

    #[test]
    fn zero_bandwidth_period_accumulates_time_without_progress() {
        let mut network = NetworkModel::new(
            trace(&[(500.0, 0.0, 0.0), (500.0, 100.0, 0.0)]),
            manifest(vec![50.0]),
            ProgressThresholds::default(),
        );
        let progress = network.download(1000.0, 0, 0, 0.0, None);
        // 500 ms stalled, then 1000 bits at 100 bits/ms.
        assert!((progress.time - 510.0).abs() < 1e-9);
    }

    #[test]
    fn delay_crosses_periods_and_wraps() {
        let mut network = NetworkModel::new(
            trace(&[(300.0, 10.0, 0.0), (200.0, 20.0, 0.0)]),
            manifest(vec![5.0]),
            ProgressThresholds::default(),
        );
        network.delay(900.0);
        assert!((network.total_time() - 900.0).abs() < 1e-9);
        // 300 + 200 + 300 puts the cursor 100 ms into the second period.
        assert_eq!(network.index, 1);
        assert!((network.time_to_next - 100.0).abs() < 1e-9);
    }

    #[test]
    fn abandoned_download_bills_partial_time_only() {
        let mut network = NetworkModel::new(
            trace(&[(10_000.0, 500.0, 100.0)]),
            manifest(vec![100.0, 200.0]),
            ProgressThresholds::default(),
        );
        let mut calls = 0;
        let mut check = |progress: &DownloadProgress, _bl: f64| {
            calls += 1;
            assert!(progress.downloaded < progress.size);
            Some(Abandon::ToQuality(progress.quality - 1))
        };
        let progress = network.download(1_000_000.0, 0, 1, 0.0, Some(&mut check));
        assert_eq!(calls, 1);
        assert_eq!(progress.abandon, Some(Abandon::ToQuality(0)));
        assert!(progress.downloaded < progress.size);
        // One latency delay plus the first checkpoint's worth of data.
        assert_eq!(progress.downloaded, 12_000.0);
        assert!((progress.time - (100.0 + 12_000.0 / 500.0)).abs() < 1e-9);
    }

    #[test]
    fn checkpoint_never_sees_completed_transfer() {
        let mut network = NetworkModel::new(
            trace(&[(10_000.0, 500.0, 20.0)]),
            manifest(vec![100.0]),
            ProgressThresholds::default(),
        );
        let mut check = |progress: &DownloadProgress, _bl: f64| {
            assert!(progress.downloaded < progress.size);
            None
        };
        let progress = network.download(100_000.0, 0, 0, 0.0, Some(&mut check));
        assert_eq!(progress.downloaded, 100_000.0);
        assert_eq!(progress.abandon, None);
    }

    #[test]
    fn sustainable_quality_shift_is_recorded_on_period_entry() {
        let mut network = NetworkModel::new(
            trace(&[(1000.0, 90.0, 0.0), (1000.0, 450.0, 100.0)]),
            manifest(vec![100.0, 200.0, 400.0]),
            ProgressThresholds::default(),
        );
        assert_eq!(network.pop_shift(), None);
        network.delay(1500.0);
        // Second period: effective bandwidth 450 * (1 - 100/1000) = 405,
        // sustaining quality 2.
        assert_eq!(network.sustainable_quality(), 2);
        let shift = network.pop_shift().unwrap();
        assert_eq!(shift.quality, 2);
        assert_eq!(shift.previous, 0);
        assert!((shift.at - 1000.0).abs() < 1e-9);
        assert_eq!(network.pop_shift(), None);
    }

    #[test]
    fn initial_period_can_advertise_at_time_zero() {
        let mut network = NetworkModel::new(
            trace(&[(1000.0, 1000.0, 0.0)]),
            manifest(vec![100.0, 200.0]),
            ProgressThresholds::default(),
        );
        let shift = network.pop_shift().unwrap();
        assert_eq!(shift.at, 0.0);
        assert_eq!(shift.quality, 1);
        assert_eq!(shift.previous, 0);
    }

    #[test]
    fn zero_size_download_is_free() {
        let mut network = NetworkModel::new(
            trace(&[(1000.0, 1000.0, 100.0)]),
            manifest(vec![100.0]),
            ProgressThresholds::default(),
        );
        let progress = network.download(0.0, 3, 0, 0.0, None);
        assert_eq!(progress.time, 0.0);
        assert_eq!(progress.downloaded, 0.0);
        assert_eq!(network.total_time(), 0.0);
    }
}
