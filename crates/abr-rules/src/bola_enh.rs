//! BOLA-E: BOLA with a startup phase, a placeholder buffer and the
//! insufficient buffer rule.
//!
//! The placeholder is virtual buffer that stands in for network-imposed
//! delays, so the Lyapunov decision keeps its operating point instead of
//! oscillating after every pause. Utilities are shifted so the lowest level
//! has utility 1, which pins the decision boundaries to `minimum_buffer`.

use sim_engine::{Abr, DownloadProgress, Manifest, SessionView};
use tracing::debug;

use crate::RuleConfig;

const MINIMUM_BUFFER: f64 = 10_000.0;
const MINIMUM_BUFFER_PER_LEVEL: f64 = 2_000.0;
const LOW_BUFFER_SAFETY_FACTOR: f64 = 0.5;
const LOW_BUFFER_SAFETY_FACTOR_INIT: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Startup,
    Steady,
}

pub struct BolaEnh {
    utilities: Vec<f64>,
    gp: f64,
    vp: f64,
    abr_osc: bool,
    no_ibr: bool,
    state: State,
    placeholder: f64,
    last_quality: usize,
    ibr_safety: f64,
}

impl BolaEnh {
    pub fn new(manifest: &Manifest, config: &RuleConfig) -> Self {
        // utilities[0] = 1
        let offset = 1.0 - manifest.bitrates[0].ln();
        let utilities: Vec<f64> = manifest.bitrates.iter().map(|b| b.ln() + offset).collect();
        let top_utility = utilities[utilities.len() - 1];

        let (gp, vp) = if config.no_ibr {
            // match basic BOLA
            let gp = config.gp - 1.0;
            let vp = (config.buffer_size - manifest.segment_time) / (top_utility + gp);
            (gp, vp)
        } else {
            let buffer = (MINIMUM_BUFFER + MINIMUM_BUFFER_PER_LEVEL * manifest.quality_count() as f64)
                .max(config.buffer_size);
            let gp = (top_utility - 1.0) / (buffer / MINIMUM_BUFFER - 1.0);
            let vp = MINIMUM_BUFFER / gp;
            (gp, vp)
        };

        for (q, u) in utilities.iter().enumerate() {
            debug!(quality = q, top_up_level = vp * (gp + u), "buffer boundary");
        }

        Self {
            utilities,
            gp,
            vp,
            abr_osc: config.abr_osc,
            no_ibr: config.no_ibr,
            state: State::Startup,
            placeholder: 0.0,
            last_quality: 0,
            ibr_safety: LOW_BUFFER_SAFETY_FACTOR_INIT,
        }
    }

    fn quality_from_buffer(&self, view: &SessionView<'_>, level: f64) -> usize {
        let mut quality = 0;
        let mut best: Option<f64> = None;
        for (q, &bitrate) in view.manifest.bitrates.iter().enumerate() {
            let score = (self.vp * (self.utilities[q] + self.gp) - level) / bitrate;
            if best.is_none_or(|s| score > s) {
                quality = q;
                best = Some(score);
            }
        }
        quality
    }

    /// Buffer level above which BOLA prefers `quality` over every cheaper
    /// level with lower utility.
    fn min_buffer_for_quality(&self, view: &SessionView<'_>, quality: usize) -> f64 {
        let bitrates = &view.manifest.bitrates;
        let bitrate = bitrates[quality];
        let utility = self.utilities[quality];

        let mut level = 0.0f64;
        for q in 0..quality {
            if self.utilities[q] < utility {
                let b = bitrates[q];
                let u = self.utilities[q];
                let boundary = self.vp * (self.gp + (bitrate * u - b * utility) / (bitrate - b));
                level = level.max(boundary);
            }
        }
        level
    }

    /// Buffer level at which `quality` stops being worth topping up.
    fn max_buffer_for_quality(&self, quality: usize) -> f64 {
        self.vp * (self.utilities[quality] + self.gp)
    }
}

impl Abr for BolaEnh {
    fn quality_delay(&mut self, view: &SessionView<'_>, _segment_index: usize) -> (usize, f64) {
        let buffer_level = view.buffer_level();

        if self.state == State::Startup {
            let Some(throughput) = view.throughput else {
                return (self.last_quality, 0.0);
            };
            self.state = State::Steady;
            self.ibr_safety = LOW_BUFFER_SAFETY_FACTOR_INIT;
            let quality = view.quality_from_throughput(throughput);
            self.placeholder = (self.min_buffer_for_quality(view, quality) - buffer_level).max(0.0);
            return (quality, 0.0);
        }

        let mut quality = self.quality_from_buffer(view, buffer_level + self.placeholder);
        let quality_t = view.quality_from_throughput(view.throughput.unwrap_or(0.0));
        if quality > self.last_quality && quality > quality_t {
            quality = self.last_quality.max(quality_t);
            if !self.abr_osc {
                quality += 1;
            }
        }

        let max_level = self.max_buffer_for_quality(quality);
        let mut delay = buffer_level + self.placeholder - max_level;
        if delay > 0.0 {
            // Absorb the wait into the placeholder first; only the excess
            // becomes a real network pause.
            if delay <= self.placeholder {
                self.placeholder -= delay;
                delay = 0.0;
            } else {
                delay -= self.placeholder;
                self.placeholder = 0.0;
            }
        } else {
            delay = 0.0;
        }

        if quality == view.manifest.quality_count() - 1 {
            delay = 0.0;
        }

        if !self.no_ibr {
            let safe_size = self.ibr_safety
                * (buffer_level - view.latency.unwrap_or(0.0))
                * view.throughput.unwrap_or(0.0);
            self.ibr_safety *= LOW_BUFFER_SAFETY_FACTOR_INIT;
            self.ibr_safety = self.ibr_safety.max(LOW_BUFFER_SAFETY_FACTOR);
            for q in 0..quality {
                if view.manifest.bitrates[q + 1] * view.manifest.segment_time > safe_size {
                    quality = q;
                    delay = 0.0;
                    let min_level = self.min_buffer_for_quality(view, quality);
                    let max_placeholder = (min_level - buffer_level).max(0.0);
                    self.placeholder = self.placeholder.min(max_placeholder);
                    break;
                }
            }
        }

        (quality, delay)
    }

    fn report_delay(&mut self, _view: &SessionView<'_>, delay: f64) {
        self.placeholder += delay;
    }

    fn report_download(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        is_replacement: bool,
    ) {
        self.last_quality = progress.quality;
        let level = view.buffer_level();

        match (progress.abandon_to_quality(), progress.is_abandoned()) {
            (None, false) if is_replacement => {
                self.placeholder += view.manifest.segment_time;
            }
            (None, false) => {
                // Keep the placeholder from outgrowing the level this
                // download actually earned.
                let level_was = level + progress.time;
                let max_placeholder = (self.max_buffer_for_quality(progress.quality) - level_was).max(0.0);
                self.placeholder = self.placeholder.min(max_placeholder);

                if level > 0.0 {
                    // An externally imposed decision can leave the
                    // placeholder too small; never inflate it while
                    // rebuffering though.
                    let min_placeholder =
                        self.min_buffer_for_quality(view, progress.quality) - level_was;
                    self.placeholder = self.placeholder.max(min_placeholder);
                }
            }
            (abandoned_to, _) if !is_replacement => {
                // Abandonment means trouble; deflate toward a conservative
                // level.
                let want_level = match abandoned_to {
                    Some(q) if q > 0 => self.min_buffer_for_quality(view, q),
                    _ => MINIMUM_BUFFER,
                };
                let max_placeholder = (want_level - level).max(0.0);
                self.placeholder = self.placeholder.min(max_placeholder);
            }
            _ => {
                // Abandoned replacement: nothing to adjust.
            }
        }
    }

    fn report_seek(&mut self, _view: &SessionView<'_>, _where_ms: f64) {
        // The buffer was reset underneath us; start over.
        self.state = State::Startup;
        self.placeholder = 0.0;
        self.last_quality = 0;
    }

    fn check_abandon(
        &mut self,
        view: &SessionView<'_>,
        progress: &DownloadProgress,
        buffer_level: f64,
    ) -> Option<usize> {
        let remain = progress.size - progress.downloaded;
        if progress.downloaded <= 0.0 || remain <= 0.0 {
            return None;
        }

        // Abandoning re-pays the latency, so score against the state we
        // would be in after it.
        let bl = (buffer_level + self.placeholder - progress.time_to_first_bit).max(0.0);
        let tp = progress.downloaded / (progress.time - progress.time_to_first_bit);
        let sz = remain - progress.time_to_first_bit * tp;
        if sz <= 0.0 {
            return None;
        }

        let bitrates = &view.manifest.bitrates;
        let mut abandon_to = None;
        let mut score = (self.vp * (self.gp + self.utilities[progress.quality]) - bl) / sz;

        for q in 0..progress.quality {
            let other_size = progress.size * bitrates[q] / bitrates[progress.quality];
            let other_score = (self.vp * (self.gp + self.utilities[q]) - bl) / other_size;
            if other_size < sz && other_score > score {
                score = other_score;
                abandon_to = Some(q);
            }
        }

        abandon_to
    }
}

#[cfg(test)]
mod tests {
    use sim_engine::{ManifestSource, PlaybackBuffer};

    use super::*;

    fn manifest() -> Manifest {
        Manifest::new(
            ManifestSource {
                segment_duration_ms: 3000.0,
                bitrates_kbps: vec![300.0, 750.0, 1500.0, 3000.0],
                segment_sizes_bits: vec![vec![1.0, 2.0, 3.0, 4.0]; 100],
            },
            None,
        )
        .unwrap()
    }

    fn view<'a>(
        manifest: &'a Manifest,
        buffer: &'a PlaybackBuffer,
        throughput: Option<f64>,
    ) -> SessionView<'a> {
        SessionView {
            manifest,
            buffer,
            throughput,
            latency: throughput.map(|_| 0.0),
        }
    }

    #[test]
    fn startup_without_estimate_stays_at_first_quality() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        let (quality, delay) = abr.quality_delay(&view(&manifest, &buffer, None), 1);
        assert_eq!((quality, delay), (0, 0.0));
        assert_eq!(abr.state, State::Startup);
    }

    #[test]
    fn startup_with_estimate_initializes_placeholder() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        let (quality, delay) = abr.quality_delay(&view(&manifest, &buffer, Some(2000.0)), 1);
        assert_eq!(quality, 2);
        assert_eq!(delay, 0.0);
        assert_eq!(abr.state, State::Steady);
        // With an empty buffer the placeholder covers the whole minimum
        // level for the chosen quality.
        let v = view(&manifest, &buffer, Some(2000.0));
        assert!((abr.placeholder - abr.min_buffer_for_quality(&v, 2)).abs() < 1e-9);
    }

    #[test]
    fn buffer_boundaries_bracket_each_quality() {
        let manifest = manifest();
        let abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        let v = view(&manifest, &buffer, None);
        for q in 0..manifest.quality_count() {
            let min = abr.min_buffer_for_quality(&v, q);
            let max = abr.max_buffer_for_quality(q);
            assert!(min < max, "quality {q}: min {min} >= max {max}");
            // Just above the minimum boundary the decision must not fall
            // below q.
            assert!(abr.quality_from_buffer(&v, min + 1.0) >= q);
        }
        // Above the top boundary the decision is the top level.
        let top = manifest.quality_count() - 1;
        assert_eq!(abr.quality_from_buffer(&v, abr.max_buffer_for_quality(top)), top);
    }

    #[test]
    fn network_delay_accretes_into_placeholder() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        abr.report_delay(&view(&manifest, &buffer, None), 1234.0);
        assert_eq!(abr.placeholder, 1234.0);
    }

    #[test]
    fn successful_replacement_grows_placeholder_by_one_segment() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let mut buffer = PlaybackBuffer::new(manifest.segment_time);
        for i in 0..3 {
            buffer.push(i, 0);
        }
        let progress = DownloadProgress {
            index: 1,
            quality: 2,
            size: 1000.0,
            downloaded: 1000.0,
            time: 100.0,
            time_to_first_bit: 10.0,
            abandon: None,
        };
        abr.placeholder = 500.0;
        abr.report_download(&view(&manifest, &buffer, Some(1000.0)), &progress, true);
        assert_eq!(abr.placeholder, 500.0 + manifest.segment_time);
        assert_eq!(abr.last_quality, 2);
    }

    #[test]
    fn abandonment_deflates_placeholder() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        abr.placeholder = 50_000.0;
        let progress = DownloadProgress {
            index: 1,
            quality: 3,
            size: 1000.0,
            downloaded: 400.0,
            time: 100.0,
            time_to_first_bit: 10.0,
            abandon: Some(sim_engine::Abandon::ToQuality(0)),
        };
        abr.report_download(&view(&manifest, &buffer, Some(1000.0)), &progress, false);
        // Empty buffer, conservative target MINIMUM_BUFFER.
        assert_eq!(abr.placeholder, MINIMUM_BUFFER);
    }

    #[test]
    fn seek_returns_to_startup() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        abr.state = State::Steady;
        abr.placeholder = 9000.0;
        abr.last_quality = 3;
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        abr.report_seek(&view(&manifest, &buffer, Some(1000.0)), 12_000.0);
        assert_eq!(abr.state, State::Startup);
        assert_eq!(abr.placeholder, 0.0);
        assert_eq!(abr.last_quality, 0);
    }

    #[test]
    fn ibr_downshifts_when_buffer_cannot_cover_next_level() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        abr.state = State::Steady;
        abr.placeholder = 30_000.0;
        abr.last_quality = 3;
        // Tiny real buffer: one segment with most of it consumed.
        let mut buffer = PlaybackBuffer::new(manifest.segment_time);
        buffer.push(0, 0);
        buffer.set_fcc(2800.0);
        let (quality, delay) = abr.quality_delay(&view(&manifest, &buffer, Some(3000.0)), 5);
        // safe_size = 0.9 * 200 * 3000 = 540000 < 750 * 3000, so the rule
        // forces the bottom level.
        assert_eq!(quality, 0);
        assert_eq!(delay, 0.0);
        assert_eq!(abr.placeholder, 0.0);
    }

    #[test]
    fn ibr_safety_decays_with_floor() {
        let manifest = manifest();
        let mut abr = BolaEnh::new(&manifest, &RuleConfig::default());
        abr.state = State::Steady;
        let buffer = PlaybackBuffer::new(manifest.segment_time);
        for _ in 0..20 {
            let _ = abr.quality_delay(&view(&manifest, &buffer, Some(1000.0)), 5);
        }
        assert_eq!(abr.ibr_safety, LOW_BUFFER_SAFETY_FACTOR);
    }
}
