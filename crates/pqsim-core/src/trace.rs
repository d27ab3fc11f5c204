//! Event trace of a run.
//!
//! When `record_trace` is set the engine keeps one [`TraceEvent`] per
//! lifecycle step. Each event renders as a fixed-width log line and
//! serializes as one JSON object per line (JSONL), so traces from two runs
//! can be diffed directly.

use crate::job::{JobId, ReplicaKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read or write trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Failed to encode trace event: {0}")]
    Encode(serde_json::Error),
}

/// One step in a job's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The job arrived and was routed to `copies` queues.
    Arrival {
        time: f64,
        job: JobId,
        copies: usize,
        replicated: bool,
    },
    /// The replica was granted its server after waiting `wait`.
    Waited {
        time: f64,
        replica: ReplicaKey,
        wait: f64,
    },
    /// The replica finished service, `total` after its job arrived.
    Finished {
        time: f64,
        replica: ReplicaKey,
        total: f64,
    },
    /// The replica was withdrawn because a sibling finished.
    Interrupted {
        time: f64,
        replica: ReplicaKey,
        in_service: bool,
    },
}

impl TraceEvent {
    pub fn time(&self) -> f64 {
        match self {
            TraceEvent::Arrival { time, .. }
            | TraceEvent::Waited { time, .. }
            | TraceEvent::Finished { time, .. }
            | TraceEvent::Interrupted { time, .. } => *time,
        }
    }

    pub fn job(&self) -> JobId {
        match self {
            TraceEvent::Arrival { job, .. } => *job,
            TraceEvent::Waited { replica, .. }
            | TraceEvent::Finished { replica, .. }
            | TraceEvent::Interrupted { replica, .. } => replica.job,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Arrival {
                time,
                job,
                copies,
                replicated: true,
            } => write!(f, "{:7.4} {}: Arrival for {} copies", time, job, copies),
            TraceEvent::Arrival { time, job, .. } => write!(f, "{:7.4} {}: Arrival", time, job),
            TraceEvent::Waited { time, replica, wait } => {
                write!(f, "{:7.4} {}: Waited {:6.3}", time, replica, wait)
            }
            TraceEvent::Finished {
                time,
                replica,
                total,
            } => write!(f, "{:7.4} {}: Finished, total {:.3}", time, replica, total),
            TraceEvent::Interrupted { time, replica, .. } => {
                write!(f, "{:7.4} {}: Interrupted", time, replica)
            }
        }
    }
}

/// Write events as JSONL.
pub fn write_jsonl<W: Write>(events: &[TraceEvent], mut writer: W) -> Result<(), TraceError> {
    for event in events {
        let line = serde_json::to_string(event).map_err(TraceError::Encode)?;
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Save events to a JSONL file.
pub fn save_jsonl(events: &[TraceEvent], path: &Path) -> Result<(), TraceError> {
    let file = std::fs::File::create(path)?;
    write_jsonl(events, std::io::BufWriter::new(file))
}

/// Load a JSONL trace file.
pub fn load_jsonl(path: &Path) -> Result<Vec<TraceEvent>, TraceError> {
    let file = std::fs::File::open(path)?;
    parse_jsonl(BufReader::new(file))
}

/// Parse JSONL from any reader. Blank lines and `#` comments are skipped.
pub fn parse_jsonl<R: Read>(reader: BufReader<R>) -> Result<Vec<TraceEvent>, TraceError> {
    let mut events = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|e| TraceError::JsonParse {
            line: line_num + 1,
            source: e,
        })?;
        events.push(event);
    }
    Ok(events)
}
