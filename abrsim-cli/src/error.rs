use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sim(#[from] sim_engine::SimError),

    #[error(transparent)]
    Strategy(#[from] abr_rules::StrategyError),
}

pub type Result<T> = std::result::Result<T, CliError>;
