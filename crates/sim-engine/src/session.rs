//! Session orchestration: the per-segment download loop.
//!
//! The runner owns every long-lived entity of a run — buffer, network
//! model, estimator, strategy, replacer, seek queue, metrics — and advances
//! the network and playback clocks in lockstep. Strategies observe the
//! session only through [`SessionView`].
//!
//! A seek observed while the buffer depletes interrupts the current cycle:
//! `deplete_buffer` returns `false`, the runner discards the in-flight
//! download (no buffer update, no throughput sample) and restarts its
//! decision loop. This mirrors the explicit loop-restart design of the
//! simulation, with no control-flow-by-exception.

use std::sync::Arc;

use tracing::warn;

use crate::abr::{Abr, Replacement, SessionView};
use crate::buffer::PlaybackBuffer;
use crate::estimator::ThroughputHistory;
use crate::manifest::Manifest;
use crate::metrics::{Metrics, SessionSummary};
use crate::network::{Abandon, AbandonCheck, DownloadProgress, NetworkModel};
use crate::reaction::ReactionTracker;
use crate::report::{DelayKind, DownloadRecord, SeekRecord, SessionObserver};
use crate::seek::SeekQueue;

/// Runner knobs that are not strategy configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum buffer size, ms.
    pub max_buffer_size: f64,
    /// Gamma-p product used by the summary score.
    pub gamma_p: f64,
    /// Quality index counting as "ramped up"; `None` tracks the sustainable
    /// quality of the current network period.
    pub rampup_threshold: Option<usize>,
    /// Disable the abandonment checkpoints entirely.
    pub no_abandon: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 25_000.0,
            gamma_p: 5.0,
            rampup_threshold: None,
            no_abandon: false,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    buffer: PlaybackBuffer,
    next_segment: usize,
    total_play_time: f64,
    last_seek_time: f64,
    rampup_origin: f64,
    rampup_time: Option<f64>,
    last_played: Option<usize>,
    abandoned_to_quality: Option<usize>,
    seeks: SeekQueue,
    metrics: Metrics,
}

pub struct SessionRunner<'a> {
    manifest: Arc<Manifest>,
    network: NetworkModel,
    estimator: Box<dyn ThroughputHistory>,
    abr: Box<dyn Abr>,
    replacer: Box<dyn Replacement>,
    tracker: ReactionTracker,
    config: SessionConfig,
    state: SessionState,
    observer: &'a mut dyn SessionObserver,
}

fn view<'v>(
    manifest: &'v Manifest,
    buffer: &'v PlaybackBuffer,
    estimator: &dyn ThroughputHistory,
) -> SessionView<'v> {
    SessionView {
        manifest,
        buffer,
        throughput: estimator.throughput(),
        latency: estimator.latency(),
    }
}

impl<'a> SessionRunner<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest: Arc<Manifest>,
        network: NetworkModel,
        estimator: Box<dyn ThroughputHistory>,
        abr: Box<dyn Abr>,
        replacer: Box<dyn Replacement>,
        seeks: SeekQueue,
        config: SessionConfig,
        observer: &'a mut dyn SessionObserver,
    ) -> Self {
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        let tracker = ReactionTracker::new(config.max_buffer_size);
        Self {
            manifest,
            network,
            estimator,
            abr,
            replacer,
            tracker,
            config,
            state: SessionState {
                buffer,
                next_segment: 0,
                total_play_time: 0.0,
                last_seek_time: 0.0,
                rampup_origin: 0.0,
                rampup_time: None,
                last_played: None,
                abandoned_to_quality: None,
                seeks,
                metrics: Metrics::default(),
            },
            observer,
        }
    }

    /// Run the whole session: startup download, per-segment loop, final
    /// playout. Returns the metric summary.
    pub fn run(&mut self) -> SessionSummary {
        self.drain_network_shifts();
        self.startup();
        while self.state.next_segment < self.manifest.segment_count() {
            self.step();
        }
        self.playout();
        let summary = self.summary();
        self.observer.on_summary(&summary);
        summary
    }

    fn buffer_level(&self) -> f64 {
        self.state.buffer.level()
    }

    fn drain_network_shifts(&mut self) {
        while let Some(shift) = self.network.pop_shift() {
            self.tracker
                .advertise(shift, &self.state.buffer, &mut self.state.metrics);
        }
    }

    /// Download the first segment before playback starts.
    fn startup(&mut self) {
        let quality = {
            let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
            self.abr.first_quality(&v)
        };
        let size = self.manifest.segments[0][quality];
        let progress = self.network.download(size, 0, quality, 0.0, None);
        self.drain_network_shifts();

        let download_time = progress.time - progress.time_to_first_bit;
        self.state.metrics.startup_time = download_time;
        self.state.buffer.push(0, progress.quality);
        if download_time > 0.0 {
            self.estimator.push(
                download_time,
                progress.size / download_time,
                progress.time_to_first_bit,
            );
        }
        self.state.total_play_time += progress.time;

        let (bandwidth, latency) = self.network.current_conditions();
        let record = DownloadRecord {
            segment: 0,
            start_time: 0.0,
            end_time: progress.time.round(),
            downloaded_effective: progress.downloaded,
            time_effective: progress.time,
            bitrate: self.manifest.bitrates[progress.quality],
            progress,
            replacement: false,
            interrupted: false,
            buffer_level_before: 0.0,
            buffer_level_after: self.buffer_level(),
            bandwidth,
            latency,
            rebuffer_time: 0.0,
            buffer_mode: self.abr.buffer_mode_active(),
        };
        self.observer.on_startup(&record);

        self.state.next_segment = 1;
        // Seeks scheduled inside the startup download can never cross the
        // interrupt path; apply them now.
        self.handle_due_seeks();
    }

    /// One iteration of the download loop. Early returns model the
    /// loop-restart after a seek.
    fn step(&mut self) {
        let segment_time = self.manifest.segment_time;

        // Drop extra content when one more segment would overflow.
        let full_delay = self.buffer_level() + segment_time - self.config.max_buffer_size;
        if full_delay > 0.0 {
            if !self.deplete_buffer(full_delay) {
                return;
            }
            self.network.delay(full_delay);
            self.drain_network_shifts();
            let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
            self.abr.report_delay(&v, full_delay);
            self.observer
                .on_delay(DelayKind::FullBuffer, full_delay, self.buffer_level());
        }

        // Reuse the abandonment target when the previous cycle aborted.
        let (quality, mut delay, replace) = match self.state.abandoned_to_quality.take() {
            Some(q) => (q, 0.0, None),
            None => {
                let (q, d) = {
                    let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
                    self.abr.quality_delay(&v, self.state.next_segment)
                };
                let r = {
                    let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
                    self.replacer.check_replace(&v, q)
                };
                (q, d, r)
            }
        };

        let current_segment = match replace {
            Some(offset) => {
                delay = 0.0;
                (self.state.next_segment as isize + offset) as usize
            }
            None => self.state.next_segment,
        };
        let size = self.manifest.segments[current_segment][quality];

        if delay > 0.0 {
            if !self.deplete_buffer(delay) {
                return;
            }
            self.network.delay(delay);
            self.drain_network_shifts();
            self.observer
                .on_delay(DelayKind::Abr, delay, self.buffer_level());
        }

        let buffer_level = self.buffer_level();
        let progress = {
            let manifest = &self.manifest;
            let state = &self.state;
            let estimator = &self.estimator;
            let abr = &mut self.abr;
            let replacer = &mut self.replacer;
            let replacing = replace.is_some();
            let mut check = |progress: &DownloadProgress, safe_level: f64| -> Option<Abandon> {
                let v = view(manifest, &state.buffer, &**estimator);
                if replacing {
                    replacer.check_abandon(&v, progress, safe_level)
                } else {
                    abr.check_abandon(&v, progress, safe_level)
                        .map(Abandon::ToQuality)
                }
            };
            let callback: Option<&mut AbandonCheck<'_>> = if self.config.no_abandon {
                None
            } else {
                Some(&mut check)
            };
            self.network
                .download(size, current_segment, quality, buffer_level, callback)
        };
        self.drain_network_shifts();

        let start_time = self.state.total_play_time.round();
        let completed = self.deplete_buffer(progress.time);
        let end_time = self.state.total_play_time.round();
        let (bandwidth, latency) = self.network.current_conditions();

        if !completed {
            // Seek mid-depletion: discard the download and restart.
            let effective_end = self.state.last_seek_time;
            let time_effective = effective_end - start_time;
            let downloaded_effective = if progress.time > 0.0 {
                (progress.downloaded * time_effective / progress.time).floor()
            } else {
                0.0
            };
            let level = self.buffer_level();
            let record = DownloadRecord {
                segment: current_segment,
                start_time,
                end_time: effective_end,
                bitrate: self.manifest.bitrates[progress.quality],
                progress,
                replacement: replace.is_some(),
                interrupted: true,
                downloaded_effective,
                time_effective,
                buffer_level_before: level,
                buffer_level_after: level,
                bandwidth,
                latency,
                rebuffer_time: 0.0,
                buffer_mode: self.abr.buffer_mode_active(),
            };
            self.observer.on_download(&record);
            return;
        }

        let buffer_level_before = self.buffer_level();
        match (replace, progress.abandon) {
            (None, None) => {
                self.state.buffer.push(self.state.next_segment, quality);
                self.state.next_segment += 1;
            }
            (None, Some(Abandon::ToQuality(q))) => {
                self.state.abandoned_to_quality = Some(q);
            }
            (None, Some(Abandon::TooLate)) => {
                // The strategy path never yields this sentinel.
            }
            (Some(offset), None) => {
                if self.buffer_level() + segment_time * offset as f64 >= 0.0 {
                    self.state.buffer.replace_quality(offset, quality);
                } else {
                    warn!(segment = current_segment, "too late to replace");
                }
            }
            (Some(_), Some(_)) => {
                // Abandoned replacement: nothing to apply.
            }
        }

        let record = DownloadRecord {
            segment: current_segment,
            start_time,
            end_time,
            downloaded_effective: progress.downloaded,
            time_effective: progress.time,
            bitrate: self.manifest.bitrates[progress.quality],
            progress: progress.clone(),
            replacement: replace.is_some(),
            interrupted: false,
            buffer_level_before,
            buffer_level_after: self.buffer_level(),
            bandwidth,
            latency,
            rebuffer_time: self.state.metrics.segment_rebuffer_time,
            buffer_mode: self.abr.buffer_mode_active(),
        };
        self.observer.on_download(&record);
        self.state.metrics.segment_rebuffer_time = 0.0;

        {
            let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
            self.abr.report_download(&v, &progress, replace.is_some());
        }

        let download_time = progress.time - progress.time_to_first_bit;
        let measured = if download_time > 0.0 {
            progress.downloaded / download_time
        } else {
            0.0
        };
        if let Some(estimate) = self.estimator.throughput() {
            self.state.metrics.record_estimate_error(estimate, measured);
        }
        if progress.abandon.is_none() {
            self.estimator
                .push(download_time, measured, progress.time_to_first_bit);
        }
    }

    /// Play out whatever is still buffered after the last download.
    fn playout(&mut self) {
        self.deplete_buffer(self.buffer_level());
        // guard against rounding residue
        self.state.buffer.clear();
    }

    /// Consume `time` ms of playback from the buffer, charging rebuffer
    /// time when it runs dry. Returns `false` when a seek interrupted the
    /// advance (the caller restarts its loop).
    fn deplete_buffer(&mut self, mut time: f64) -> bool {
        let segment_time = self.manifest.segment_time;

        if self.state.buffer.is_empty() {
            self.state.metrics.rebuffer_time += time;
            if self.advance_play_time(time) {
                return false;
            }
            self.state.metrics.rebuffer_event_count += 1;
            self.state.metrics.segment_rebuffer_time = time;
            return true;
        }

        if self.state.buffer.fcc() > 0.0 {
            if time + self.state.buffer.fcc() < segment_time {
                self.state.buffer.add_fcc(time);
                return !self.advance_play_time(time);
            }
            let dt = segment_time - self.state.buffer.fcc();
            time -= dt;
            if self.advance_play_time(dt) {
                return false;
            }
            self.state.buffer.pop_front();
            self.state.buffer.set_fcc(0.0);
        }

        while time > 0.0 {
            let Some(entry) = self.state.buffer.head() else {
                break;
            };
            let quality = entry.quality;

            self.state.metrics.played_utility += self.manifest.utilities[quality];
            self.state.metrics.played_bitrate += self.manifest.bitrates[quality];
            if let Some(last) = self.state.last_played {
                if quality != last {
                    self.state.metrics.total_bitrate_change +=
                        (self.manifest.bitrates[quality] - self.manifest.bitrates[last]).abs();
                    self.state.metrics.total_log_bitrate_change +=
                        (self.manifest.bitrates[quality] / self.manifest.bitrates[last])
                            .ln()
                            .abs();
                }
            }
            self.state.last_played = Some(quality);

            if self.state.rampup_time.is_none() {
                let threshold = self
                    .config
                    .rampup_threshold
                    .unwrap_or(self.network.sustainable_quality());
                if quality >= threshold {
                    self.state.rampup_time =
                        Some(self.state.total_play_time - self.state.rampup_origin);
                }
            }

            self.tracker
                .complete_reached(quality, self.state.total_play_time);

            if time >= segment_time {
                self.state.buffer.pop_front();
                if self.advance_play_time(segment_time) {
                    return false;
                }
                time -= segment_time;
            } else {
                self.state.buffer.set_fcc(time);
                if self.advance_play_time(time) {
                    return false;
                }
                time = 0.0;
            }
        }

        if time > 0.0 {
            self.state.metrics.rebuffer_time += time;
            if self.advance_play_time(time) {
                return false;
            }
            self.state.metrics.rebuffer_event_count += 1;
            self.state.metrics.segment_rebuffer_time = time;
        }

        self.tracker
            .process(self.state.total_play_time, &mut self.state.metrics);
        true
    }

    /// Advance playback time by `delta`, firing at most one seek whose
    /// trigger time falls inside the interval. Returns `true` when a seek
    /// fired (playback time then sits exactly at the seek instant).
    fn advance_play_time(&mut self, delta: f64) -> bool {
        let crossing = self.state.seeks.peek().is_some_and(|event| {
            let when_ms = event.when * 1000.0;
            self.state.total_play_time < when_ms
                && self.state.total_play_time + delta >= when_ms
        });
        if !crossing {
            self.state.total_play_time += delta;
            return false;
        }
        if let Some(event) = self.state.seeks.pop() {
            self.state.total_play_time = event.when * 1000.0;
            self.apply_seek(event.to);
            return true;
        }
        false
    }

    /// Apply every queued seek that is already due, in order, without
    /// advancing playback time.
    pub fn handle_due_seeks(&mut self) {
        while self
            .state
            .seeks
            .peek()
            .is_some_and(|event| event.when * 1000.0 <= self.state.total_play_time)
        {
            if let Some(event) = self.state.seeks.pop() {
                self.apply_seek(event.to);
            }
        }
    }

    /// Realign the session at playback position `seek_to` (seconds).
    ///
    /// The target segment is the boundary nearest to the position (first
    /// half rounds down, second half rounds up). Buffered entries at or
    /// after the target survive; everything else is dropped.
    fn apply_seek(&mut self, seek_to: f64) {
        let segment_time = self.manifest.segment_time;
        let seek_to_ms = seek_to * 1000.0;
        let floor_index = (seek_to_ms / segment_time).floor() as usize;
        let within = seek_to_ms - floor_index as f64 * segment_time;
        let new_segment = if within < segment_time / 2.0 {
            floor_index
        } else {
            floor_index + 1
        };

        self.state.last_seek_time = self.state.total_play_time;
        self.observer.on_seek(&SeekRecord {
            play_time: self.state.total_play_time,
            seek_to,
            new_segment,
        });

        let buffer_base = self.state.next_segment as isize - self.state.buffer.len() as isize;
        if !self.state.buffer.is_empty()
            && new_segment as isize >= buffer_base
            && new_segment < self.state.next_segment
        {
            self.state.buffer.drop_front((new_segment as isize - buffer_base) as usize);
        } else {
            self.state.buffer.clear();
            self.state.next_segment = new_segment;
        }

        self.state.buffer.set_fcc(if new_segment == floor_index {
            seek_to_ms - floor_index as f64 * segment_time
        } else {
            0.0
        });

        {
            let v = view(&self.manifest, &self.state.buffer, &*self.estimator);
            self.abr.report_seek(&v, seek_to_ms);
            self.replacer.report_seek(&v, seek_to_ms);
        }

        self.state.rampup_origin = self.state.total_play_time;
        self.state.rampup_time = None;
    }

    fn summary(&self) -> SessionSummary {
        let m = &self.state.metrics;
        SessionSummary {
            buffer_size: self.config.max_buffer_size,
            gamma_p: self.config.gamma_p,
            segment_time: self.manifest.segment_time,
            segment_count: self.manifest.segment_count(),
            total_play_time: self.state.total_play_time,
            network_total_time: self.network.total_time(),
            played_utility: m.played_utility,
            played_bitrate: m.played_bitrate,
            rebuffer_time: m.rebuffer_time,
            rebuffer_event_count: m.rebuffer_event_count,
            total_bitrate_change: m.total_bitrate_change,
            total_log_bitrate_change: m.total_log_bitrate_change,
            total_reaction_time: m.total_reaction_time,
            overestimate_count: m.overestimate_count,
            overestimate_average: m.overestimate_average,
            goodestimate_count: m.goodestimate_count,
            goodestimate_average: m.goodestimate_average,
            estimate_average: m.estimate_average,
            rampup_time: self.state.rampup_time,
            startup_time: m.startup_time,
        }
    }
}
