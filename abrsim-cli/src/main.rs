//! `abrsim` — adaptive bitrate streaming session simulator.

mod cli;
mod error;
mod input;
mod report;

use std::process;
use std::sync::Arc;

use abr_rules::{Registry, RuleConfig};
use clap::Parser;
use mimalloc::MiMalloc;
use sim_engine::{
    Ewma, NetworkModel, ProgressThresholds, SessionConfig, SessionRunner, SlidingWindow,
    ThroughputHistory,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, AverageKind};
use crate::error::Result;
use crate::report::Reporter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        error!("simulation setup failed: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    let manifest = Arc::new(input::load_manifest(&args.movie, args.movie_length)?);
    let trace = input::load_trace(&args.network, args.network_multiplier)?;
    let seeks = input::load_seeks(args.seek_config.as_deref())?;

    let registry = Registry::with_builtins();
    let rule_config = RuleConfig {
        buffer_size: args.max_buffer * 1000.0,
        gp: args.gamma_p,
        abr_osc: args.abr_osc,
        abr_basic: args.abr_basic,
        no_ibr: args.no_insufficient_buffer_rule,
    };
    let abr = registry.build_abr(&args.abr, &manifest, &rule_config)?;
    let replacer = registry.build_replacement(&args.replace)?;

    let estimator: Box<dyn ThroughputHistory> = match args.moving_average {
        AverageKind::Ewma => {
            let half_life_ms = args.half_life.iter().map(|h| h * 1000.0).collect();
            Box::new(Ewma::new(half_life_ms, manifest.segment_time))
        }
        AverageKind::Sliding => Box::new(SlidingWindow::new(args.window_size.clone())),
    };

    let network = NetworkModel::new(trace, Arc::clone(&manifest), ProgressThresholds::default());
    let session_config = SessionConfig {
        max_buffer_size: args.max_buffer * 1000.0,
        gamma_p: args.gamma_p,
        rampup_threshold: args.rampup_threshold,
        no_abandon: args.no_abandon,
    };

    let mut reporter = Reporter::new(args.verbose, args.graph);
    let mut runner = SessionRunner::new(
        manifest,
        network,
        estimator,
        abr,
        replacer,
        seeks,
        session_config,
        &mut reporter,
    );
    runner.run();

    Ok(())
}
