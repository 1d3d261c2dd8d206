//! Configuration for a reconciliation run

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ReconcileError, Result};

/// Capacity of the descriptor queue and of the mismatch queue
pub const QUEUE_CAPACITY: usize = 50;

/// Lock files (`~$...`) smaller than this are transient and never compared
pub const LOCK_FILE_SIZE_THRESHOLD: u64 = 200;

/// How a source descriptor is judged against its destination entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    /// Destination size equals the source size (current or old snapshot)
    #[default]
    SizeEqual,
    /// Destination is at least as large as the source
    SizeGreaterOrEqual,
    /// Destination is at least as large and strictly newer
    SizeGreaterOrEqualAndModifiedAfter,
}

impl CompareMode {
    /// Get the flag spelling of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareMode::SizeEqual => "size-eq",
            CompareMode::SizeGreaterOrEqual => "size-ge",
            CompareMode::SizeGreaterOrEqualAndModifiedAfter => "size-ge-mod-after",
        }
    }
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CompareMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "size-eq" => Ok(CompareMode::SizeEqual),
            "size-ge" => Ok(CompareMode::SizeGreaterOrEqual),
            "size-ge-mod-after" => Ok(CompareMode::SizeGreaterOrEqualAndModifiedAfter),
            other => Err(ReconcileError::config(format!(
                "unknown compare mode {:?} (expected size-eq, size-ge or size-ge-mod-after)",
                other
            ))),
        }
    }
}

/// Layout of the source inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceSchema {
    /// 5-field project list, paths relative to the base directory
    #[default]
    Project,
    /// 7-field listing with absolute paths
    Listing,
}

/// Where the destination snapshot comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationSpec {
    /// 7-field listing, optionally amended by an older listing
    Listing {
        path: PathBuf,
        old_path: Option<PathBuf>,
    },
    /// 6-field cloud export; paths rebuilt under `prefix` with `strip` removed
    Cloud {
        path: PathBuf,
        prefix: String,
        strip: Option<String>,
    },
}

impl DestinationSpec {
    /// Primary snapshot path
    pub fn path(&self) -> &PathBuf {
        match self {
            DestinationSpec::Listing { path, .. } | DestinationSpec::Cloud { path, .. } => path,
        }
    }
}

impl Default for DestinationSpec {
    fn default() -> Self {
        DestinationSpec::Listing {
            path: PathBuf::new(),
            old_path: None,
        }
    }
}

/// Configuration for one reconciliation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Base directory prepended to project-list paths
    pub base_dir: String,

    /// Destination snapshot(s)
    pub destination: DestinationSpec,

    /// Source inventory file
    pub source_path: PathBuf,

    /// Layout of the source inventory
    pub source_schema: SourceSchema,

    /// Mismatch output file (truncated if it exists)
    pub output_path: PathBuf,

    /// Source rows whose path contains this substring are skipped
    pub ignore: Option<String>,

    /// Number of comparison workers
    /// 0 means auto-detect (half the CPU cores)
    pub num_workers: usize,

    /// Comparison policy
    pub mode: CompareMode,

    /// Emit JSON progress messages on stderr
    pub show_progress: bool,
}

impl ReconcileConfig {
    /// Create a config builder
    pub fn builder() -> ReconcileConfigBuilder {
        ReconcileConfigBuilder::new()
    }

    /// Get the effective number of workers
    pub fn effective_workers(&self) -> usize {
        effective_workers(self.num_workers)
    }

    /// The ignore substring, if set to something non-empty
    pub fn ignore_pattern(&self) -> Option<&str> {
        self.ignore.as_deref().filter(|s| !s.is_empty())
    }

    /// Check that every required path is present
    pub fn validate(&self) -> Result<()> {
        if self.destination.path().as_os_str().is_empty() {
            return Err(ReconcileError::config("destination snapshot path is required"));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(ReconcileError::config("source inventory path is required"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ReconcileError::config("output path is required"));
        }
        if self.source_schema == SourceSchema::Project && self.base_dir.is_empty() {
            return Err(ReconcileError::config(
                "base directory is required for project source lists",
            ));
        }
        if let DestinationSpec::Cloud { prefix, .. } = &self.destination {
            if prefix.is_empty() {
                return Err(ReconcileError::config(
                    "base directory is required for cloud destination exports",
                ));
            }
        }
        Ok(())
    }
}

/// Resolve a requested worker count; 0 means half the available parallelism
pub fn effective_workers(requested: usize) -> usize {
    if requested == 0 {
        std::thread::available_parallelism()
            .map(|p| (p.get() / 2).max(1))
            .unwrap_or(1)
    } else {
        requested
    }
}

/// Builder for ReconcileConfig
#[derive(Debug, Default)]
pub struct ReconcileConfigBuilder {
    config: ReconcileConfig,
}

impl ReconcileConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory
    pub fn base_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.base_dir = dir.into();
        self
    }

    /// Use a listing destination with an optional old listing
    pub fn listing_destination(mut self, path: PathBuf, old_path: Option<PathBuf>) -> Self {
        self.config.destination = DestinationSpec::Listing { path, old_path };
        self
    }

    /// Use a cloud export destination
    pub fn cloud_destination(
        mut self,
        path: PathBuf,
        prefix: impl Into<String>,
        strip: Option<String>,
    ) -> Self {
        self.config.destination = DestinationSpec::Cloud {
            path,
            prefix: prefix.into(),
            strip,
        };
        self
    }

    /// Set the source inventory
    pub fn source(mut self, path: PathBuf, schema: SourceSchema) -> Self {
        self.config.source_path = path;
        self.config.source_schema = schema;
        self
    }

    /// Set the output file
    pub fn output_path(mut self, path: PathBuf) -> Self {
        self.config.output_path = path;
        self
    }

    /// Set the ignore substring
    pub fn ignore(mut self, pattern: Option<String>) -> Self {
        self.config.ignore = pattern;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the comparison mode
    pub fn mode(mut self, mode: CompareMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enable or disable JSON progress output
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> ReconcileConfig {
        self.config
    }
}
