//! Quality-of-experience metric accumulators and the end-of-run summary.

/// Running sums and counters updated while the session plays out.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub played_utility: f64,
    pub played_bitrate: f64,
    pub rebuffer_time: f64,
    pub rebuffer_event_count: u64,
    /// Rebuffer attributable to the current download cycle; reported with
    /// the per-segment record and reset after a normal emission.
    pub segment_rebuffer_time: f64,
    pub total_bitrate_change: f64,
    pub total_log_bitrate_change: f64,
    pub total_reaction_time: f64,
    pub overestimate_count: u64,
    pub overestimate_average: f64,
    pub goodestimate_count: u64,
    pub goodestimate_average: f64,
    pub estimate_average: f64,
    pub startup_time: f64,
}

impl Metrics {
    /// Fold one download's measured throughput against the estimate that
    /// preceded it, maintaining the running over/good-estimate averages.
    pub fn record_estimate_error(&mut self, estimate: f64, measured: f64) {
        if estimate > measured {
            self.overestimate_count += 1;
            self.overestimate_average +=
                (estimate - measured - self.overestimate_average) / self.overestimate_count as f64;
        } else {
            self.goodestimate_count += 1;
            self.goodestimate_average +=
                (measured - estimate - self.goodestimate_average) / self.goodestimate_count as f64;
        }
        self.estimate_average += (estimate - measured - self.estimate_average)
            / (self.overestimate_count + self.goodestimate_count) as f64;
    }
}

/// Final session summary, assembled by the runner after playout.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub buffer_size: f64,
    pub gamma_p: f64,
    pub segment_time: f64,
    pub segment_count: usize,
    pub total_play_time: f64,
    pub network_total_time: f64,
    pub played_utility: f64,
    pub played_bitrate: f64,
    pub rebuffer_time: f64,
    pub rebuffer_event_count: u64,
    pub total_bitrate_change: f64,
    pub total_log_bitrate_change: f64,
    pub total_reaction_time: f64,
    pub overestimate_count: u64,
    pub overestimate_average: f64,
    pub goodestimate_count: u64,
    pub goodestimate_average: f64,
    pub estimate_average: f64,
    /// First wall time at which playback reached the rampup threshold;
    /// `None` when it never did.
    pub rampup_time: Option<f64>,
    pub startup_time: f64,
}

impl SessionSummary {
    /// Scale factor turning totals into per-segment-duration averages.
    pub fn to_time_average(&self) -> f64 {
        1.0 / (self.total_play_time / self.segment_time)
    }

    /// Time-average QoE score: utility minus the gamma-p weighted rebuffer
    /// penalty.
    pub fn time_average_score(&self) -> f64 {
        self.to_time_average()
            * (self.played_utility - self.gamma_p * self.rebuffer_time / self.segment_time)
    }

    /// Rampup time with the whole-asset fallback used when playback never
    /// reached the threshold.
    pub fn rampup_or_asset_seconds(&self) -> f64 {
        match self.rampup_time {
            Some(t) => t / 1000.0,
            None => self.segment_count as f64 * self.segment_time / 1000.0,
        }
    }
}
