//! Input file loading: read JSON from disk into the engine's source shapes
//! and hand off to engine-side validation.

use std::fs;
use std::path::Path;

use sim_engine::{
    Manifest, ManifestSource, NetworkTrace, PeriodSource, SeekQueue, SeekScheduleSource,
};

use crate::error::{CliError, Result};

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_owned(),
        source,
    })
}

pub fn load_manifest(path: &Path, movie_length: Option<f64>) -> Result<Manifest> {
    let source: ManifestSource = read_json(path)?;
    Ok(Manifest::new(source, movie_length)?)
}

pub fn load_trace(path: &Path, multiplier: f64) -> Result<NetworkTrace> {
    let periods: Vec<PeriodSource> = read_json(path)?;
    Ok(NetworkTrace::new(periods, multiplier)?)
}

pub fn load_seeks(path: Option<&Path>) -> Result<SeekQueue> {
    match path {
        Some(path) => {
            let schedule: SeekScheduleSource = read_json(path)?;
            Ok(SeekQueue::new(schedule.seeks))
        }
        None => Ok(SeekQueue::empty()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn manifest_roundtrip() {
        let file = write_temp(
            r#"{
                "segment_duration_ms": 3000,
                "bitrates_kbps": [100, 200],
                "segment_sizes_bits": [[300000, 600000], [330000, 660000]]
            }"#,
        );
        let manifest = load_manifest(file.path(), None).unwrap();
        assert_eq!(manifest.segment_time, 3000.0);
        assert_eq!(manifest.segment_count(), 2);
    }

    #[test]
    fn trace_applies_multiplier() {
        let file = write_temp(
            r#"[{ "duration_ms": 1000, "bandwidth_kbps": 500, "latency_ms": 50 }]"#,
        );
        let trace = load_trace(file.path(), 2.0).unwrap();
        assert_eq!(trace.period(0).bandwidth, 1000.0);
    }

    #[test]
    fn seeks_are_sorted() {
        let file = write_temp(
            r#"{ "seeks": [
                { "seek_when": 9.0, "seek_to": 1.0 },
                { "seek_when": 2.0, "seek_to": 30.0 }
            ]}"#,
        );
        let mut seeks = load_seeks(Some(file.path())).unwrap();
        assert_eq!(seeks.pop().unwrap().when, 2.0);
        assert_eq!(seeks.pop().unwrap().when, 9.0);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_manifest(Path::new("/nonexistent/movie.json"), None).unwrap_err();
        assert!(err.to_string().contains("movie.json"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let file = write_temp("{ not json");
        assert!(matches!(
            load_manifest(file.path(), None),
            Err(CliError::Parse { .. })
        ));
    }
}
