//! Video manifest: segment duration, bitrate ladder, per-segment sizes.
//!
//! Units follow the engine-wide convention: sizes in bits, times in
//! milliseconds, rates in bits/ms (numerically equal to kbit/s).

use serde::Deserialize;

use crate::SimError;

/// JSON shape of a manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestSource {
    pub segment_duration_ms: f64,
    pub bitrates_kbps: Vec<f64>,
    pub segment_sizes_bits: Vec<Vec<f64>>,
}

/// Validated manifest.
///
/// `utilities[q] = ln(bitrates[q]) - ln(bitrates[0])`, so the lowest level
/// has utility zero. Strategies that need a different offset (BOLA-E) shift
/// these themselves.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub segment_time: f64,
    pub bitrates: Vec<f64>,
    pub utilities: Vec<f64>,
    pub segments: Vec<Vec<f64>>,
}

impl Manifest {
    /// Build a manifest from its JSON shape.
    ///
    /// `movie_length` (seconds) optionally truncates or cyclically repeats
    /// the segment list to cover exactly that duration.
    pub fn new(source: ManifestSource, movie_length: Option<f64>) -> Result<Self, SimError> {
        let ManifestSource {
            segment_duration_ms,
            bitrates_kbps,
            segment_sizes_bits,
        } = source;

        if !(segment_duration_ms > 0.0) {
            return Err(SimError::InvalidManifest {
                reason: format!("segment duration must be positive, got {segment_duration_ms}"),
            });
        }
        if bitrates_kbps.is_empty() {
            return Err(SimError::InvalidManifest {
                reason: "empty bitrate ladder".into(),
            });
        }
        if bitrates_kbps.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(SimError::InvalidManifest {
                reason: "bitrate ladder must be strictly increasing".into(),
            });
        }
        if bitrates_kbps[0] <= 0.0 {
            return Err(SimError::InvalidManifest {
                reason: "bitrates must be positive".into(),
            });
        }
        if segment_sizes_bits.is_empty() {
            return Err(SimError::InvalidManifest {
                reason: "no segments".into(),
            });
        }
        if let Some(row) = segment_sizes_bits
            .iter()
            .find(|row| row.len() != bitrates_kbps.len())
        {
            return Err(SimError::InvalidManifest {
                reason: format!(
                    "segment size row has {} entries for {} bitrates",
                    row.len(),
                    bitrates_kbps.len()
                ),
            });
        }

        let mut segments = segment_sizes_bits;
        if let Some(length_secs) = movie_length {
            let l1 = segments.len();
            let l2 = (length_secs * 1000.0 / segment_duration_ms).ceil() as usize;
            if l2 == 0 {
                return Err(SimError::InvalidManifest {
                    reason: format!("movie length {length_secs}s yields no segments"),
                });
            }
            let repeats = l2.div_ceil(l1);
            let pattern = segments.clone();
            for _ in 1..repeats {
                segments.extend(pattern.iter().cloned());
            }
            segments.truncate(l2);
        }

        let offset = -bitrates_kbps[0].ln();
        let utilities = bitrates_kbps.iter().map(|b| b.ln() + offset).collect();

        Ok(Self {
            segment_time: segment_duration_ms,
            bitrates: bitrates_kbps,
            utilities,
            segments,
        })
    }

    /// Number of quality levels in the ladder.
    pub fn quality_count(&self) -> usize {
        self.bitrates.len()
    }

    /// Number of segments in the (possibly repeated/trimmed) asset.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
