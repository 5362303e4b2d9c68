use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ControllerState {
    #[default]
    Idle,
    Configuring,
    Reading,
    Draining,
    CellComplete,
    SessionComplete,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    Sweep,
    Capture,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Sweep => f.write_str("sweep"),
            RunMode::Capture => f.write_str("capture"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Grid or time budget exhausted.
    Completed,
    /// Operator asked to stop.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    /// Completed walks over the grid; always 1 for a capture.
    pub passes: u32,
    pub cells_visited: u64,
    pub reads_issued: u64,
    pub buffer_full_events: u64,
    pub rows_written: u64,
    pub malformed_skipped: u64,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn new(mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            mode,
            outcome: RunOutcome::Completed,
            started_at: Utc::now(),
            passes: 0,
            cells_visited: 0,
            reads_issued: 0,
            buffer_full_events: 0,
            rows_written: 0,
            malformed_skipped: 0,
            elapsed_ms: 0,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} run {} {}: {} pass(es), {} cell(s), {} read(s), {} row(s) written, {} buffer-full, {} malformed, {} ms",
            self.mode,
            self.run_id,
            match self.outcome {
                RunOutcome::Completed => "completed",
                RunOutcome::Cancelled => "cancelled",
            },
            self.passes,
            self.cells_visited,
            self.reads_issued,
            self.rows_written,
            self.buffer_full_events,
            self.malformed_skipped,
            self.elapsed_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_camel_case() {
        let summary = RunSummary::new(RunMode::Sweep);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "sweep");
        assert_eq!(json["outcome"], "completed");
        assert!(json.get("rowsWritten").is_some());
        assert!(!summary.cancelled());
        assert!(summary.to_string().starts_with("sweep run "));
    }
}
