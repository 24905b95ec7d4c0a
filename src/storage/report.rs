use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::analytics::{AnalysisOutcome, MotionEvent};
use crate::config::OutputConfig;

const COMPLETE_HEADER: &str = "Motion detected at:";
const PARTIAL_HEADER: &str = "Partial results:";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonReport<'a> {
    complete: bool,
    events: &'a [MotionEvent],
}

/// Renders seconds as `H:MM:SS`, with `.ffffff` only when there are microseconds.
pub fn format_timestamp(seconds: f64) -> String {
    let total_micros = (seconds.max(0.0) * 1_000_000.0).round() as u64;
    let micros = total_micros % 1_000_000;
    let total_secs = total_micros / 1_000_000;

    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;

    let mut out = String::new();
    if days > 0 {
        let plural = if days == 1 { "" } else { "s" };
        let _ = write!(out, "{days} day{plural}, ");
    }
    let _ = write!(out, "{hours}:{minutes:02}:{secs:02}");
    if micros > 0 {
        let _ = write!(out, ".{micros:06}");
    }
    out
}

pub struct ReportWriter {
    events_path: PathBuf,
    partial_path: PathBuf,
    json: bool,
}

impl ReportWriter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            events_path: PathBuf::from(&config.events_path),
            partial_path: PathBuf::from(&config.partial_path),
            json: config.json,
        }
    }

    pub fn path_for(&self, complete: bool) -> &Path {
        if complete {
            &self.events_path
        } else {
            &self.partial_path
        }
    }

    pub fn write_outcome(&self, outcome: &AnalysisOutcome) -> Result<PathBuf, ReportError> {
        self.write(&outcome.events, !outcome.cancelled)
    }

    pub fn write(&self, events: &[MotionEvent], complete: bool) -> Result<PathBuf, ReportError> {
        let path = self.path_for(complete).to_path_buf();
        write_atomic(&path, render_text(events, complete).as_bytes())?;

        if self.json {
            let json_path = json_path_for(&path);
            let body = serde_json::to_vec_pretty(&JsonReport { complete, events })?;
            write_atomic(&json_path, &body)?;
        }

        tracing::info!(
            path = %path.display(),
            events = events.len(),
            complete,
            "wrote motion report"
        );

        Ok(path)
    }
}

fn render_text(events: &[MotionEvent], complete: bool) -> String {
    let mut out = String::new();
    out.push_str(if complete {
        COMPLETE_HEADER
    } else {
        PARTIAL_HEADER
    });
    out.push('\n');
    for event in events {
        let _ = writeln!(
            out,
            "{} - {}",
            format_timestamp(event.start),
            format_timestamp(event.end)
        );
    }
    out
}

// `results.txt` gets `results.json`; a text path already named `.json` gets `.json.json`.
fn json_path_for(path: &Path) -> PathBuf {
    let json_path = path.with_extension("json");
    if json_path != path {
        return json_path;
    }
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".json");
    path.with_file_name(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let temp_path = temp_path_for(path);
    std::fs::write(&temp_path, data).map_err(io_err)?;
    std::fs::rename(&temp_path, path).map_err(io_err)
}
