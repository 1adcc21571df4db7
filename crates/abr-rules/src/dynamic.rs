//! Hybrid strategies: run a BOLA variant and the throughput rule side by
//! side and pick per decision based on buffer-level hysteresis.

use sim_engine::{Abr, DownloadProgress, Manifest, SessionView};

use crate::bola::Bola;
use crate::bola_enh::BolaEnh;
use crate::throughput::ThroughputRule;
use crate::RuleConfig;

/// BOLA + ThroughputRule.
///
/// Switches to the throughput rule when the buffer runs low *and* BOLA
/// agrees the quality should drop; switches back once the buffer recovers
/// and BOLA is at least as ambitious.
pub struct Dynamic {
    bola: Bola,
    tput: ThroughputRule,
    is_bola: bool,
}

const LOW_BUFFER_THRESHOLD: f64 = 10_000.0;

impl Dynamic {
    pub fn new(manifest: &Manifest, config: &RuleConfig) -> Self {
        Self {
            bola: Bola::new(manifest, config),
            tput: ThroughputRule::new(config),
            is_bola: false,
        }
    }
}

impl Abr for Dynamic {
    fn first_quality(&self, view: &SessionView<'_>) -> usize {
        if self.is_bola {
            self.bola.first_quality(view)
        } else {
            self.tput.first_quality(view)
        }
    }

    fn quality_delay(&mut self, view: &SessionView<'_>, segment_index: usize) -> (usize, f64) {
        let level = view.buffer_level();

        let b = self.bola.quality_delay(view, segment_index);
        let t = self.tput.quality_delay(view, segment_index);

        if self.is_bola {
            if level < LOW_BUFFER_THRESHOLD && b.0 < t.0 {
                self.is_bola = false;
            }
        } else if level > LOW_BUFFER_THRESHOLD && b.0 >= t.0 {
            self.is_bola = true;
        }

        if self.is_bola { b } else { t }
    }

    fn report_delay(&mut self, view: &SessionView<'_>, delay: f64) {
        self.bola.report_delay(view, delay);
        self.tput.report_delay(view, delay);
    }

    fn report_download(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        is_replacement: bool,
    ) {
        self.bola.report_download(view, progress, is_replacement);
        self.tput.report_download(view, progress, is_replacement);
        if is_replacement {
            self.is_bola = false;
        }
    }

    fn report_seek(&mut self, view: &SessionView<'_>, where_ms: f64) {
        self.bola.report_seek(view, where_ms);
        self.tput.report_seek(view, where_ms);
    }

    fn check_abandon(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        buffer_level: f64,
    ) -> Option<usize> {
        // Abandonment stays with the throughput rule in both modes; the
        // BOLA branch is deliberately not wired in.
        self.tput.check_abandon(view, progress, buffer_level)
    }

    fn buffer_mode_active(&self) -> bool {
        self.is_bola
    }
}

/// BOLA-E + ThroughputRule with fixed low/high buffer thresholds.
pub struct DynamicDash {
    bola: BolaEnh,
    tput: ThroughputRule,
    low_threshold: f64,
    high_threshold: f64,
    is_bola: bool,
}

impl DynamicDash {
    pub fn new(manifest: &Manifest, config: &RuleConfig) -> Self {
        Self {
            bola: BolaEnh::new(manifest, config),
            tput: ThroughputRule::new(config),
            low_threshold: 5_000.0,
            high_threshold: 10_000.0,
            is_bola: false,
        }
    }
}

impl Abr for DynamicDash {
    fn first_quality(&self, view: &SessionView<'_>) -> usize {
        if self.is_bola {
            self.bola.first_quality(view)
        } else {
            self.tput.first_quality(view)
        }
    }

    fn quality_delay(&mut self, view: &SessionView<'_>, segment_index: usize) -> (usize, f64) {
        let level = view.buffer_level();
        if self.is_bola && level < self.low_threshold {
            self.is_bola = false;
        } else if !self.is_bola && level > self.high_threshold {
            self.is_bola = true;
        }

        if self.is_bola {
            self.bola.quality_delay(view, segment_index)
        } else {
            self.tput.quality_delay(view, segment_index)
        }
    }

    fn report_delay(&mut self, view: &SessionView<'_>, delay: f64) {
        self.bola.report_delay(view, delay);
        self.tput.report_delay(view, delay);
    }

    fn report_download(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        is_replacement: bool,
    ) {
        self.bola.report_download(view, progress, is_replacement);
        self.tput.report_download(view, progress, is_replacement);
    }

    fn report_seek(&mut self, view: &SessionView<'_>, where_ms: f64) {
        self.bola.report_seek(view, where_ms);
        self.tput.report_seek(view, where_ms);
    }

    fn check_abandon(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        buffer_level: f64,
    ) -> Option<usize> {
        if self.is_bola {
            self.bola.check_abandon(view, progress, buffer_level)
        } else {
            self.tput.check_abandon(view, progress, buffer_level)
        }
    }

    fn buffer_mode_active(&self) -> bool {
        self.is_bola
    }
}
