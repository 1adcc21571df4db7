//! Rendering of session events: per-download verbose lines, graph lines
//! for extraction, and the terminal summary block.

use sim_engine::{DelayKind, DownloadRecord, SeekRecord, SessionObserver, SessionSummary};

/// Truncate a millisecond/bit quantity for display.
fn whole(x: f64) -> i64 {
    x as i64
}

/// Prints session events to stdout in the enabled formats.
pub struct Reporter {
    verbose: bool,
    graph: bool,
}

impl Reporter {
    pub fn new(verbose: bool, graph: bool) -> Self {
        Self { verbose, graph }
    }

    fn verbose_line(&self, record: &DownloadRecord) {
        let p = &record.progress;
        let mut line = format!(
            "[{}-{}]  {}: quality={} download_size={}/{} download_time={}={}+{} ",
            whole(record.start_time),
            whole(record.end_time),
            record.segment,
            p.quality,
            whole(record.downloaded_effective),
            whole(p.size),
            whole(record.time_effective),
            whole(p.time_to_first_bit),
            whole(record.time_effective - p.time_to_first_bit),
        );
        let levels = format!(
            "{}->{}",
            whole(record.buffer_level_before),
            whole(record.buffer_level_after)
        );
        if record.replacement {
            if p.is_abandoned() {
                line.push_str(&format!(
                    " REPLACEMENT ABANDONED after {}={}+{} ttfb+ttdl  bl={levels}",
                    whole(p.time),
                    whole(p.time_to_first_bit),
                    whole(p.time - p.time_to_first_bit),
                ));
            } else {
                line.push_str(&format!(" REPLACEMENT  bl={levels}"));
            }
        } else if let Some(q) = p.abandon_to_quality() {
            line.push_str(&format!(
                " ABANDONED to {q} - {}/{} bits in {}={}+{} ttfb+ttdl  bl={levels}",
                whole(p.downloaded),
                whole(p.size),
                whole(p.time),
                whole(p.time_to_first_bit),
                whole(p.time - p.time_to_first_bit),
            ));
        } else {
            line.push_str(&format!("buffer_level={levels}"));
        }
        println!("{line}");
    }

    fn graph_line(&self, record: &DownloadRecord) {
        let p = &record.progress;
        println!(
            "{} time={} network_bandwidth={} network_latency={} quality={} bitrate={} \
             download_size={} download_time={} buffer_level={} rebuffer_time={} is_bola={}",
            record.segment,
            whole(record.end_time),
            whole(record.bandwidth),
            whole(record.latency),
            p.quality,
            whole(record.bitrate),
            whole(record.downloaded_effective),
            whole(record.time_effective),
            whole(record.buffer_level_after),
            whole(record.rebuffer_time),
            record.buffer_mode,
        );
    }
}

impl SessionObserver for Reporter {
    fn on_startup(&mut self, record: &DownloadRecord) {
        if self.verbose {
            let p = &record.progress;
            println!(
                "[0-{}]  0: quality={} download_size={}/{} download_time={}={}+{} \
                 buffer_level=0->0->{}",
                whole(record.end_time),
                p.quality,
                whole(p.downloaded),
                whole(p.size),
                whole(p.time),
                whole(p.time_to_first_bit),
                whole(p.time - p.time_to_first_bit),
                whole(record.buffer_level_after),
            );
        }
        if self.graph {
            // Two points: session start and the end of the startup download.
            let p = &record.progress;
            println!(
                "0 time=0 network_bandwidth={} network_latency={} quality={} bitrate={} \
                 download_size=0 download_time=0 buffer_level=0 rebuffer_time=0 is_bola={}",
                whole(record.bandwidth),
                whole(record.latency),
                p.quality,
                whole(record.bitrate),
                record.buffer_mode,
            );
            self.graph_line(record);
        }
    }

    fn on_download(&mut self, record: &DownloadRecord) {
        if self.verbose {
            self.verbose_line(record);
        }
        if self.graph {
            self.graph_line(record);
        }
    }

    fn on_seek(&mut self, record: &SeekRecord) {
        if self.verbose {
            println!(
                "[Seek] At playback time {} ms: seeking to {} seconds (segment index {})",
                whole(record.play_time),
                record.seek_to,
                record.new_segment,
            );
        }
    }

    fn on_delay(&mut self, kind: DelayKind, delay: f64, buffer_level: f64) {
        if self.verbose {
            match kind {
                DelayKind::FullBuffer => {
                    println!("full buffer delay {} bl={}", whole(delay), whole(buffer_level));
                }
                DelayKind::Abr => {
                    println!("abr delay {} bl={}", whole(delay), whole(buffer_level));
                }
            }
        }
    }

    fn on_summary(&mut self, summary: &SessionSummary) {
        if !self.verbose {
            return;
        }
        let avg = summary.to_time_average();
        println!("buffer size: {}", whole(summary.buffer_size));
        println!("total played utility: {:.6}", summary.played_utility);
        println!(
            "time average played utility: {:.6}",
            summary.played_utility * avg
        );
        println!("total played bitrate: {:.6}", summary.played_bitrate);
        println!(
            "time average played bitrate: {:.6}",
            summary.played_bitrate * avg
        );
        println!("total play time: {:.6}", summary.total_play_time / 1000.0);
        println!(
            "total play time chunks: {:.6}",
            summary.total_play_time / summary.segment_time
        );
        println!("total rebuffer: {:.6}", summary.rebuffer_time / 1000.0);
        println!(
            "rebuffer ratio: {:.6}",
            summary.rebuffer_time / summary.total_play_time
        );
        println!(
            "time average rebuffer: {:.6}",
            summary.rebuffer_time / 1000.0 * avg
        );
        println!("total rebuffer events: {}", summary.rebuffer_event_count);
        println!(
            "time average rebuffer events: {:.6}",
            summary.rebuffer_event_count as f64 * avg
        );
        println!(
            "total bitrate change: {:.6}",
            summary.total_bitrate_change
        );
        println!(
            "time average bitrate change: {:.6}",
            summary.total_bitrate_change * avg
        );
        println!(
            "total log bitrate change: {:.6}",
            summary.total_log_bitrate_change
        );
        println!(
            "time average log bitrate change: {:.6}",
            summary.total_log_bitrate_change * avg
        );
        println!("time average score: {:.6}", summary.time_average_score());
        println!("over estimate count: {}", summary.overestimate_count);
        println!("over estimate: {:.6}", summary.overestimate_average);
        println!("leq estimate count: {}", summary.goodestimate_count);
        println!("leq estimate: {:.6}", summary.goodestimate_average);
        println!("estimate: {:.6}", summary.estimate_average);
        println!("rampup time: {:.6}", summary.rampup_or_asset_seconds());
        println!(
            "total reaction time: {:.6}",
            summary.total_reaction_time / 1000.0
        );
        println!(
            "network total time: {:.6}",
            summary.network_total_time / 1000.0
        );
    }
}
