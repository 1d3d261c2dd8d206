//! Progress reporting module for reconciliation runs
//!
//! This module provides JSON-line messages describing run progress, written
//! to stderr for callers that drive the reconciler from another program.

use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::pipeline::ReconcileReport;

/// Run phase indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Destination index fully built
    Index,
    /// Source drained and all comparisons done
    Compare,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Index => "index",
            RunPhase::Compare => "compare",
        }
    }
}

/// Start message sent when a run begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Always "start"
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    /// ms since reporter creation
    pub ts: u64,
    /// Comparison mode flag value
    pub mode: &'static str,
    /// Effective worker count
    pub workers: usize,
    /// Source inventory path
    pub source: String,
    /// Primary destination snapshot path
    pub destination: String,
}

/// Phase completion message
#[derive(Debug, Clone, Serialize)]
pub struct PhaseMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    pub phase: RunPhase,
    /// Items handled in the phase (entries indexed, descriptors compared)
    #[serde(rename = "n")]
    pub count: u64,
}

/// Error message sent when a run fails
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// `ReconcileErrorKind` name
    pub error_type: String,
    pub message: String,
    /// File that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Line that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

/// Done message sent when a run completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    pub seq: u64,
    pub ts: u64,
    /// Total mismatch lines written
    #[serde(rename = "tw")]
    pub written: u64,
    #[serde(rename = "ne")]
    pub non_existent: u64,
    #[serde(rename = "sm")]
    pub size_mismatch: u64,
    #[serde(rename = "ss")]
    pub size_shrink: u64,
    #[serde(rename = "mt")]
    pub modified_time_invalid: u64,
    /// Total run duration in milliseconds
    pub ms: u64,
}

/// Progress reporter writing JSON lines to stderr
pub struct ProgressReporter {
    enabled: bool,
    seq: AtomicU64,
    started: Instant,
}

impl ProgressReporter {
    /// A disabled reporter drops every message
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seq: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Claim the next message sequence number
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Milliseconds since the reporter was created
    pub fn current_timestamp(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Write one message as a JSON line on stderr
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Build the start message for `config`
    pub fn start_message(&self, config: &ReconcileConfig) -> StartMessage {
        StartMessage {
            msg_type: "start",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            mode: config.mode.as_str(),
            workers: config.effective_workers(),
            source: config.source_path.to_string_lossy().to_string(),
            destination: config.destination.path().to_string_lossy().to_string(),
        }
    }

    /// Report run start
    pub fn report_start(&self, config: &ReconcileConfig) {
        if self.enabled {
            let msg = self.start_message(config);
            self.output_to_stderr(&msg);
        }
    }

    /// Report a finished phase
    pub fn report_phase(&self, phase: RunPhase, count: u64) {
        if !self.enabled {
            return;
        }
        let msg = PhaseMessage {
            msg_type: "phase",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            phase,
            count,
        };
        self.output_to_stderr(&msg);
    }

    /// Report a failure
    pub fn report_error(&self, error: &ReconcileError) {
        if !self.enabled {
            return;
        }
        let msg = ErrorProgressMessage {
            msg_type: "err",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            error_type: format!("{:?}", error.kind),
            message: error.message.clone(),
            path: error.path.as_ref().map(|p| p.to_string_lossy().to_string()),
            line: error.line,
        };
        self.output_to_stderr(&msg);
    }

    /// Build the done message for `report`
    pub fn done_message(&self, report: &ReconcileReport) -> DoneMessage {
        DoneMessage {
            msg_type: "done",
            seq: self.next_seq(),
            ts: self.current_timestamp(),
            written: report.written,
            non_existent: report.tally.non_existent,
            size_mismatch: report.tally.size_mismatch,
            size_shrink: report.tally.size_shrink,
            modified_time_invalid: report.tally.modified_time_invalid,
            ms: report.duration_ms,
        }
    }

    /// Report run completion
    pub fn report_done(&self, report: &ReconcileReport) {
        if self.enabled {
            let msg = self.done_message(report);
            self.output_to_stderr(&msg);
        }
    }
}
