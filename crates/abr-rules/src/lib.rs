//! # abr-rules
//!
//! The adaptive bitrate strategy family for the simulation engine:
//!
//! - [`Bola`] — buffer-based Lyapunov-ratio strategy
//! - [`BolaEnh`] — BOLA with startup state, placeholder buffer and the
//!   insufficient buffer rule
//! - [`ThroughputRule`] — estimate-driven rule with ETA-based abandonment
//! - [`Dynamic`] / [`DynamicDash`] — hybrids switching between a BOLA
//!   variant and the throughput rule on buffer-level hysteresis
//!
//! plus the segment [`replacement`] policies and a name-based [`Registry`]
//! with registration entry points for external strategies.

use thiserror::Error;

pub mod bola;
pub mod bola_enh;
pub mod dynamic;
pub mod registry;
pub mod replacement;
pub mod throughput;

#[cfg(test)]
mod session_tests;

pub use bola::Bola;
pub use bola_enh::BolaEnh;
pub use dynamic::{Dynamic, DynamicDash};
pub use registry::Registry;
pub use replacement::{NoReplace, Replace, ScanDirection};
pub use throughput::ThroughputRule;

/// Strategy configuration shared by the whole family.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    /// Maximum buffer size, ms.
    pub buffer_size: f64,
    /// Gamma-p product, in segment-duration units.
    pub gp: f64,
    /// Minimize oscillations instead of over-reaching by one level.
    pub abr_osc: bool,
    /// Basic mode: no dynamic buffer shrink, no abandonment (BOLA).
    pub abr_basic: bool,
    /// Disable the insufficient buffer rule.
    pub no_ibr: bool,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            buffer_size: 25_000.0,
            gp: 5.0,
            abr_osc: false,
            abr_basic: false,
            no_ibr: false,
        }
    }
}

/// Lookup failures when building strategies by name.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown ABR strategy `{0}`")]
    UnknownAbr(String),

    #[error("unknown replacement policy `{0}`")]
    UnknownReplacement(String),
}
