//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AverageKind {
    /// Double EWMA with zero-bias correction.
    Ewma,
    /// Sliding-window mean.
    Sliding,
}

/// Simulate an adaptive bitrate streaming session.
#[derive(Debug, Parser)]
#[command(name = "abrsim", version, about)]
pub struct Args {
    /// JSON file describing the network trace.
    #[arg(short = 'n', long, default_value = "network.json")]
    pub network: PathBuf,

    /// Multiply trace bandwidth by this factor.
    #[arg(long = "network-multiplier", default_value_t = 1.0)]
    pub network_multiplier: f64,

    /// JSON file describing the movie segments.
    #[arg(short = 'm', long, default_value = "movie.json")]
    pub movie: PathBuf,

    /// Movie length in seconds (repeat/trim the manifest to fit).
    #[arg(long = "movie-length")]
    pub movie_length: Option<f64>,

    /// ABR strategy name (bola, bolae, throughput, dynamic, dynamicdash).
    #[arg(short = 'a', long, default_value = "bolae")]
    pub abr: String,

    /// Basic mode (strategy dependent).
    #[arg(long = "abr-basic")]
    pub abr_basic: bool,

    /// Minimize oscillations.
    #[arg(long = "abr-osc")]
    pub abr_osc: bool,

    /// Gamma-p product in seconds.
    #[arg(long = "gamma-p", default_value_t = 5.0)]
    pub gamma_p: f64,

    /// Disable the insufficient buffer rule.
    #[arg(long = "no-insufficient-buffer-rule")]
    pub no_insufficient_buffer_rule: bool,

    /// Throughput estimator.
    #[arg(long = "moving-average", value_enum, default_value_t = AverageKind::Ewma)]
    pub moving_average: AverageKind,

    /// Sliding window sizes (samples).
    #[arg(long = "window-size", num_args = 1.., default_values_t = [3usize])]
    pub window_size: Vec<usize>,

    /// EWMA half lives (seconds).
    #[arg(long = "half-life", num_args = 1.., default_values_t = [3.0, 8.0])]
    pub half_life: Vec<f64>,

    /// Replacement policy (none, left, right).
    #[arg(short = 'r', long, default_value = "none")]
    pub replace: String,

    /// Maximum buffer size in seconds.
    #[arg(short = 'b', long = "max-buffer", default_value_t = 25.0)]
    pub max_buffer: f64,

    /// Disable download abandonment.
    #[arg(long = "no-abandon")]
    pub no_abandon: bool,

    /// Quality index counting as ramped up (default: track the network).
    #[arg(long = "rampup-threshold")]
    pub rampup_threshold: Option<usize>,

    /// Per-download log lines and the final summary block.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Space-separated key=value event lines for extraction.
    #[arg(short = 'g', long)]
    pub graph: bool,

    /// JSON file with scheduled seek events.
    #[arg(long = "seek-config")]
    pub seek_config: Option<PathBuf>,
}
