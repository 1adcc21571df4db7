//! Network trace: an ordered, cyclically repeated list of network periods.

use serde::Deserialize;

use crate::SimError;

/// JSON shape of one trace entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodSource {
    pub duration_ms: f64,
    pub bandwidth_kbps: f64,
    pub latency_ms: f64,
}

/// One network period. Bandwidth is in bits/ms, duration and latency in ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkPeriod {
    pub duration: f64,
    pub bandwidth: f64,
    pub latency: f64,
}

/// Validated cyclic trace. The simulation is bounded by the manifest, not by
/// the trace: when the last period ends the first one starts again.
#[derive(Debug, Clone)]
pub struct NetworkTrace {
    periods: Vec<NetworkPeriod>,
}

impl NetworkTrace {
    /// Build a trace, scaling every bandwidth by `multiplier`.
    pub fn new(sources: Vec<PeriodSource>, multiplier: f64) -> Result<Self, SimError> {
        if sources.is_empty() {
            return Err(SimError::InvalidTrace {
                reason: "empty trace".into(),
            });
        }
        let mut periods = Vec::with_capacity(sources.len());
        for (i, p) in sources.into_iter().enumerate() {
            if !(p.duration_ms > 0.0) {
                return Err(SimError::InvalidTrace {
                    reason: format!("period {i}: duration must be positive, got {}", p.duration_ms),
                });
            }
            if p.bandwidth_kbps < 0.0 || p.latency_ms < 0.0 {
                return Err(SimError::InvalidTrace {
                    reason: format!("period {i}: negative bandwidth or latency"),
                });
            }
            periods.push(NetworkPeriod {
                duration: p.duration_ms,
                bandwidth: p.bandwidth_kbps * multiplier,
                latency: p.latency_ms,
            });
        }
        Ok(Self { periods })
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn period(&self, index: usize) -> &NetworkPeriod {
        &self.periods[index]
    }
}
