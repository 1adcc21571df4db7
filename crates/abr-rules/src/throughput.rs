//! Throughput rule: pick the highest quality a safety-discounted estimate
//! sustains, with an ETA-based abandonment check.

use sim_engine::{Abr, DownloadProgress, SessionView};

use crate::RuleConfig;

const SAFETY_FACTOR: f64 = 0.9;
const LOW_BUFFER_SAFETY_FACTOR: f64 = 0.5;
const LOW_BUFFER_SAFETY_FACTOR_INIT: f64 = 0.9;
const ABANDON_MULTIPLIER: f64 = 1.8;
const ABANDON_GRACE_TIME: f64 = 500.0;

pub struct ThroughputRule {
    ibr_safety: f64,
    no_ibr: bool,
}

impl ThroughputRule {
    pub fn new(config: &RuleConfig) -> Self {
        Self {
            ibr_safety: LOW_BUFFER_SAFETY_FACTOR_INIT,
            no_ibr: config.no_ibr,
        }
    }
}

impl Abr for ThroughputRule {
    fn quality_delay(&mut self, view: &SessionView<'_>, _segment_index: usize) -> (usize, f64) {
        let mut quality =
            view.quality_from_throughput(view.throughput.unwrap_or(0.0) * SAFETY_FACTOR);

        if !self.no_ibr {
            let safe_size = self.ibr_safety
                * (view.buffer_level() - view.latency.unwrap_or(0.0))
                * view.throughput.unwrap_or(0.0);
            self.ibr_safety *= LOW_BUFFER_SAFETY_FACTOR_INIT;
            self.ibr_safety = self.ibr_safety.max(LOW_BUFFER_SAFETY_FACTOR);
            for q in 0..quality {
                if view.manifest.bitrates[q + 1] * view.manifest.segment_time > safe_size {
                    quality = q;
                    break;
                }
            }
        }

        (quality, 0.0)
    }

    fn report_seek(&mut self, _view: &SessionView<'_>, _where_ms: f64) {
        self.ibr_safety = LOW_BUFFER_SAFETY_FACTOR_INIT;
    }

    fn check_abandon(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        _buffer_level: f64,
    ) -> Option<usize> {
        let mut quality = None;

        let dl_time = progress.time - progress.time_to_first_bit;
        if progress.time >= ABANDON_GRACE_TIME && dl_time > 0.0 {
            let tput = progress.downloaded / dl_time;
            let size_left = progress.size - progress.downloaded;
            let estimate_time_left = size_left / tput;
            if progress.time + estimate_time_left
                > ABANDON_MULTIPLIER * view.manifest.segment_time
            {
                let q = view.quality_from_throughput(tput * SAFETY_FACTOR);
                let estimate_size =
                    progress.size * view.manifest.bitrates[q] / view.manifest.bitrates[progress.quality];
                if q < progress.quality && estimate_size < size_left {
                    quality = Some(q);
                }
            }
        }

        quality
    }
}
