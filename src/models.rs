//! Core data models for the reconciler

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A file that is expected to exist at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Normalized path (forward slashes, original case)
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Modification time, when the source inventory carries one
    pub modified_at: Option<NaiveDateTime>,
}

impl FileDescriptor {
    /// Create a descriptor without a modification time
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_at: None,
        }
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified_at: Option<NaiveDateTime>) -> Self {
        self.modified_at = modified_at;
        self
    }
}

/// Metadata known about one destination file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// Size in the primary snapshot
    pub size: u64,
    /// Modification time in the primary snapshot (`None` if unparsable)
    pub modified_at: Option<NaiveDateTime>,
    /// Size in the old snapshot, if the file was present there
    pub size_old: Option<u64>,
    /// Modification time in the old snapshot
    pub modified_at_old: Option<NaiveDateTime>,
}

impl IndexEntry {
    /// Create an entry from the primary snapshot
    pub fn new(size: u64, modified_at: Option<NaiveDateTime>) -> Self {
        Self {
            size,
            modified_at,
            size_old: None,
            modified_at_old: None,
        }
    }

    /// Whether the old snapshot amended this entry
    pub fn has_old(&self) -> bool {
        self.size_old.is_some()
    }
}

/// Why a source file failed reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// No destination entry for the path
    NonExistent,
    /// Size differs from both the current and the old destination size
    SizeMismatch,
    /// Destination is smaller than the source
    SizeShrink,
    /// Destination is not strictly newer than the source
    ModifiedTimeInvalid,
}

impl MismatchReason {
    /// All reasons, in report order
    pub const ALL: [MismatchReason; 4] = [
        MismatchReason::NonExistent,
        MismatchReason::SizeMismatch,
        MismatchReason::SizeShrink,
        MismatchReason::ModifiedTimeInvalid,
    ];

    /// Label written to the reconciliation output file
    pub fn label(&self) -> &'static str {
        match self {
            MismatchReason::NonExistent => "ファイルなし",
            MismatchReason::SizeMismatch => "ファイルサイズ不一致",
            MismatchReason::SizeShrink => "ファイルサイズ縮小",
            MismatchReason::ModifiedTimeInvalid => "ファイル更新日時エラー",
        }
    }

    /// Parse an output-file label back into a reason
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label)
    }

    /// Get the tag used in logs and JSON reports
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchReason::NonExistent => "non_existent",
            MismatchReason::SizeMismatch => "size_mismatch",
            MismatchReason::SizeShrink => "size_shrink",
            MismatchReason::ModifiedTimeInvalid => "modified_time_invalid",
        }
    }
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source file that failed reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MismatchRecord {
    pub path: String,
    pub reason: MismatchReason,
}

impl MismatchRecord {
    pub fn new(path: impl Into<String>, reason: MismatchReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }

    /// Output line without the trailing newline: `<label>,<path>`
    pub fn to_line(&self) -> String {
        format!("{},{}", self.reason.label(), self.path)
    }
}

/// Per-reason mismatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchTally {
    pub non_existent: u64,
    pub size_mismatch: u64,
    pub size_shrink: u64,
    pub modified_time_invalid: u64,
}

impl MismatchTally {
    /// Count one record
    pub fn record(&mut self, reason: MismatchReason) {
        match reason {
            MismatchReason::NonExistent => self.non_existent += 1,
            MismatchReason::SizeMismatch => self.size_mismatch += 1,
            MismatchReason::SizeShrink => self.size_shrink += 1,
            MismatchReason::ModifiedTimeInvalid => self.modified_time_invalid += 1,
        }
    }

    /// Count for a single reason
    pub fn get(&self, reason: MismatchReason) -> u64 {
        match reason {
            MismatchReason::NonExistent => self.non_existent,
            MismatchReason::SizeMismatch => self.size_mismatch,
            MismatchReason::SizeShrink => self.size_shrink,
            MismatchReason::ModifiedTimeInvalid => self.modified_time_invalid,
        }
    }

    /// Sum over all reasons
    pub fn total(&self) -> u64 {
        MismatchReason::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

/// Line counters for the line-to-line conversion commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineCounts {
    pub read: u64,
    pub written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels_round_trip() {
        for reason in MismatchReason::ALL {
            assert_eq!(MismatchReason::from_label(reason.label()), Some(reason));
        }
        assert_eq!(MismatchReason::from_label("other"), None);
    }

    #[test]
    fn test_record_line() {
        let rec = MismatchRecord::new("/a/c.txt", MismatchReason::NonExistent);
        assert_eq!(rec.to_line(), "ファイルなし,/a/c.txt");
    }

    #[test]
    fn test_tally_total() {
        let mut tally = MismatchTally::default();
        tally.record(MismatchReason::NonExistent);
        tally.record(MismatchReason::NonExistent);
        tally.record(MismatchReason::SizeShrink);
        assert_eq!(tally.non_existent, 2);
        assert_eq!(tally.size_shrink, 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&MismatchReason::ModifiedTimeInvalid).unwrap(),
            "\"modified_time_invalid\""
        );
    }

    #[test]
    fn test_index_entry_defaults() {
        let entry = IndexEntry::new(10, None);
        assert!(!entry.has_old());
        assert_eq!(entry.size_old, None);
    }
}
