//! Status file reader.
//!
//! The FL Studio controller script writes a small JSON record on every state
//! change. Reading it never fails into the caller: a missing, unreadable or
//! malformed file is simply "no snapshot this tick".

use crate::error::StatusReadError;
use chrono::Utc;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_LABEL: &str = "Idle";
pub const DEFAULT_TEMPO: i64 = 130;

/// One read of the monitored application's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySnapshot {
    pub state_label: String,
    pub tempo: i64,
    pub plugin_name: Option<String>,
    pub project_name: Option<String>,
    pub observed_at_unix_seconds: i64,
}

/// The fields that change what Discord displays. The timestamp is not part
/// of it, so rewrites of an unchanged status do not trigger a resend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayKey {
    pub state_label: String,
    pub tempo: i64,
    pub plugin_name: Option<String>,
    pub project_name: Option<String>,
}

impl ActivitySnapshot {
    pub fn display_key(&self) -> DisplayKey {
        DisplayKey {
            state_label: self.state_label.clone(),
            tempo: self.tempo,
            plugin_name: self.plugin_name.clone(),
            project_name: self.project_name.clone(),
        }
    }
}

pub trait StatusSource: Send {
    fn poll(&mut self) -> Option<ActivitySnapshot>;
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    bpm: Option<f64>,
    #[serde(default)]
    plugin: Option<String>,
    #[serde(default)]
    project_name: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a status record. Absent keys take the defaults `state = "Idle"`,
/// `bpm = 130`; a fractional tempo is truncated.
pub fn parse_status(bytes: &[u8], now: i64) -> Result<ActivitySnapshot, serde_json::Error> {
    let raw: RawStatus = serde_json::from_slice(bytes)?;
    let state_label = non_empty(raw.state).unwrap_or_else(|| DEFAULT_STATE_LABEL.to_string());
    let tempo = raw
        .bpm
        .filter(|bpm| bpm.is_finite())
        .map(|bpm| bpm.trunc() as i64)
        .unwrap_or(DEFAULT_TEMPO);

    Ok(ActivitySnapshot {
        state_label,
        tempo,
        plugin_name: non_empty(raw.plugin),
        project_name: non_empty(raw.project_name),
        observed_at_unix_seconds: raw.timestamp.unwrap_or(now),
    })
}

pub fn read_status_file(path: &Path) -> Result<ActivitySnapshot, StatusReadError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StatusReadError::Missing(path.to_path_buf()))
        }
        Err(err) => {
            return Err(StatusReadError::Unreadable {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };

    parse_status(&bytes, Utc::now().timestamp()).map_err(|source| StatusReadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// The status file written by the FL Studio controller script.
#[derive(Debug, Clone)]
pub struct JsonStatusFile {
    path: PathBuf,
}

impl JsonStatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusSource for JsonStatusFile {
    fn poll(&mut self) -> Option<ActivitySnapshot> {
        match read_status_file(&self.path) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::debug!(error = %err, "No status snapshot this tick");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_full_record() {
        let snapshot = parse_status(
            br#"{"state":"Recording","bpm":140.0,"plugin":"Serum","project_name":"Night Drive","timestamp":1700000000}"#,
            0,
        )
        .unwrap();

        assert_eq!(snapshot.state_label, "Recording");
        assert_eq!(snapshot.tempo, 140);
        assert_eq!(snapshot.plugin_name.as_deref(), Some("Serum"));
        assert_eq!(snapshot.project_name.as_deref(), Some("Night Drive"));
        assert_eq!(snapshot.observed_at_unix_seconds, 1700000000);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let snapshot = parse_status(b"{}", 42).unwrap();
        assert_eq!(snapshot.state_label, "Idle");
        assert_eq!(snapshot.tempo, 130);
        assert_eq!(snapshot.plugin_name, None);
        assert_eq!(snapshot.project_name, None);
        assert_eq!(snapshot.observed_at_unix_seconds, 42);
    }

    #[test]
    fn fractional_tempo_is_truncated() {
        let snapshot = parse_status(br#"{"bpm":127.9}"#, 0).unwrap();
        assert_eq!(snapshot.tempo, 127);
    }

    #[test]
    fn empty_plugin_is_treated_as_absent() {
        let snapshot = parse_status(br#"{"state":"Composing","plugin":""}"#, 0).unwrap();
        assert_eq!(snapshot.plugin_name, None);
    }

    #[test]
    fn display_key_ignores_timestamp() {
        let a = parse_status(br#"{"state":"Recording","bpm":140,"timestamp":1}"#, 0).unwrap();
        let b = parse_status(br#"{"state":"Recording","bpm":140,"timestamp":2}"#, 0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.display_key(), b.display_key());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_status(b"{not json", 0).is_err());
        assert!(parse_status(br#"{"bpm":"fast"}"#, 0).is_err());
    }

    #[test]
    fn poll_returns_none_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut source = JsonStatusFile::new(dir.path().join("fl_studio_state.json"));
        assert!(source.poll().is_none());
        assert!(matches!(
            read_status_file(source.path()),
            Err(StatusReadError::Missing(_))
        ));
    }

    #[test]
    fn poll_returns_none_for_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fl_studio_state.json");
        std::fs::write(&path, "{\"state\": ").unwrap();
        let mut source = JsonStatusFile::new(&path);
        assert!(source.poll().is_none());
    }

    #[test]
    fn poll_reads_written_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fl_studio_state.json");
        std::fs::write(&path, r#"{"state":"Listening","bpm":98}"#).unwrap();
        let mut source = JsonStatusFile::new(&path);
        let snapshot = source.poll().expect("snapshot");
        assert_eq!(snapshot.state_label, "Listening");
        assert_eq!(snapshot.tempo, 98);
    }
}
