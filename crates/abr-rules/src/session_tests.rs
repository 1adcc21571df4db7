//! End-to-end session runs wiring the strategy family into the engine.

use std::sync::Arc;

use sim_engine::{
    Abr, DownloadRecord, Ewma, Manifest, ManifestSource, NetworkModel, NetworkTrace,
    PeriodSource, ProgressThresholds, SeekEvent, SeekQueue, SessionConfig, SessionObserver,
    SessionRunner, SessionView, SlidingWindow,
};

use crate::registry::Registry;
use crate::replacement::NoReplace;
use crate::RuleConfig;

#[derive(Default)]
struct Recording {
    startups: Vec<DownloadRecord>,
    downloads: Vec<DownloadRecord>,
}

impl SessionObserver for Recording {
    fn on_startup(&mut self, record: &DownloadRecord) {
        self.startups.push(record.clone());
    }

    fn on_download(&mut self, record: &DownloadRecord) {
        self.downloads.push(record.clone());
    }
}

fn manifest(segments: usize, sizes: Vec<f64>, bitrates: Vec<f64>) -> Arc<Manifest> {
    Arc::new(
        Manifest::new(
            ManifestSource {
                segment_duration_ms: 1000.0,
                bitrates_kbps: bitrates,
                segment_sizes_bits: vec![sizes; segments],
            },
            None,
        )
        .unwrap(),
    )
}

fn network(manifest: &Arc<Manifest>, periods: &[(f64, f64, f64)]) -> NetworkModel {
    let trace = NetworkTrace::new(
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
    .unwrap();
    NetworkModel::new(trace, Arc::clone(manifest), ProgressThresholds::default())
}

#[test]
fn bolae_steady_run_plays_everything_without_stalls() {
    let manifest = manifest(10, vec![100.0, 200.0], vec![100.0, 200.0]);
    let network = network(&manifest, &[(1000.0, 1000.0, 100.0)]);
    let registry = Registry::with_builtins();
    let abr = registry
        .build_abr("bolae", &manifest, &RuleConfig::default())
        .unwrap();

    let mut recording = Recording::default();
    let mut runner = SessionRunner::new(
        Arc::clone(&manifest),
        network,
        Box::new(Ewma::new(vec![], manifest.segment_time)),
        abr,
        Box::new(NoReplace),
        SeekQueue::empty(),
        SessionConfig::default(),
        &mut recording,
    );
    let summary = runner.run();
    drop(runner);

    assert_eq!(summary.rebuffer_event_count, 0);
    assert_eq!(summary.rebuffer_time, 0.0);
    assert_eq!(recording.startups.len(), 1);
    assert_eq!(recording.downloads.len(), 9);

    // Every played bit is accounted by the per-download log.
    let logged_bitrate: f64 = recording
        .startups
        .iter()
        .chain(&recording.downloads)
        .map(|r| manifest.bitrates[r.progress.quality])
        .sum();
    assert_eq!(summary.played_bitrate, logged_bitrate);

    let logged_utility: f64 = recording
        .startups
        .iter()
        .chain(&recording.downloads)
        .map(|r| manifest.utilities[r.progress.quality])
        .sum();
    assert!((summary.played_utility - logged_utility).abs() < 1e-9);
}

#[test]
fn left_replacement_upgrades_buffered_slot() {
    struct StepUp;
    impl Abr for StepUp {
        fn quality_delay(&mut self, _view: &SessionView<'_>, segment_index: usize) -> (usize, f64) {
            if segment_index < 5 { (0, 0.0) } else { (2, 0.0) }
        }
    }

    let manifest = manifest(10, vec![100.0, 200.0, 400.0], vec![100.0, 200.0, 400.0]);
    let network = network(&manifest, &[(1000.0, 1000.0, 10.0)]);
    let registry = Registry::with_builtins();

    let mut recording = Recording::default();
    let mut runner = SessionRunner::new(
        Arc::clone(&manifest),
        network,
        Box::new(SlidingWindow::new(vec![3])),
        Box::new(StepUp),
        registry.build_replacement("left").unwrap(),
        SeekQueue::empty(),
        SessionConfig::default(),
        &mut recording,
    );
    let summary = runner.run();
    drop(runner);

    let replacements: Vec<&DownloadRecord> = recording
        .downloads
        .iter()
        .filter(|r| r.replacement)
        .collect();
    assert!(!replacements.is_empty());
    // Replacements re-fetch already-admitted segments at the new quality.
    for record in &replacements {
        assert!(record.progress.index < 5);
        assert_eq!(record.progress.quality, 2);
    }

    // The upgrades are audible in the played bitrate: more than ten plain
    // low-quality segments, and no stall was introduced by re-downloading.
    assert!(summary.played_bitrate > 5.0 * 100.0 + 5.0 * 400.0);
    assert_eq!(summary.rebuffer_event_count, 0);
}

#[test]
fn throughput_rule_abandons_after_bandwidth_collapse() {
    let manifest = manifest(6, vec![100_000.0, 1_000_000.0], vec![100.0, 1000.0]);
    // One fast spell long enough to bait the rule into the top quality,
    // then a long slow period.
    let network = network(&manifest, &[(300.0, 2000.0, 10.0), (1_000_000.0, 50.0, 10.0)]);
    let registry = Registry::with_builtins();
    let abr = registry
        .build_abr("throughput", &manifest, &RuleConfig::default())
        .unwrap();

    let mut recording = Recording::default();
    let mut runner = SessionRunner::new(
        Arc::clone(&manifest),
        network,
        Box::new(Ewma::new(vec![], manifest.segment_time)),
        abr,
        Box::new(NoReplace),
        SeekQueue::empty(),
        SessionConfig::default(),
        &mut recording,
    );
    let summary = runner.run();
    drop(runner);

    let abandoned: Vec<&DownloadRecord> = recording
        .downloads
        .iter()
        .filter(|r| r.progress.is_abandoned())
        .collect();
    assert!(!abandoned.is_empty());
    for record in &abandoned {
        assert!(record.progress.downloaded < record.progress.size);
        assert_eq!(record.progress.abandon_to_quality(), Some(0));
    }

    // Every segment was still admitted exactly once.
    let admitted = recording
        .downloads
        .iter()
        .filter(|r| !r.replacement && !r.interrupted && !r.progress.is_abandoned())
        .count();
    assert_eq!(admitted + recording.startups.len(), 6);
    assert!(summary.total_play_time > 0.0);
}

#[test]
fn seek_interrupts_a_download_cycle_and_run_still_finishes() {
    let manifest = manifest(10, vec![50_000.0, 100_000.0], vec![100.0, 200.0]);
    let network = network(&manifest, &[(1000.0, 100.0, 10.0)]);
    let registry = Registry::with_builtins();
    let abr = registry
        .build_abr("bolae", &manifest, &RuleConfig::default())
        .unwrap();

    let mut recording = Recording::default();
    let mut runner = SessionRunner::new(
        Arc::clone(&manifest),
        network,
        Box::new(Ewma::new(vec![], manifest.segment_time)),
        abr,
        Box::new(NoReplace),
        SeekQueue::new(vec![SeekEvent { when: 2.0, to: 6.0 }]),
        SessionConfig::default(),
        &mut recording,
    );
    let summary = runner.run();
    drop(runner);

    let interrupted = recording.downloads.iter().filter(|r| r.interrupted).count();
    assert_eq!(interrupted, 1);
    assert!(summary.total_play_time >= 2000.0);
    // Interrupted cycles are logged but deliver nothing.
    for record in recording.downloads.iter().filter(|r| r.interrupted) {
        assert!(record.time_effective <= record.progress.time);
        assert_eq!(record.rebuffer_time, 0.0);
    }
}
