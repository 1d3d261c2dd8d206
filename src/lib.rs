//! Inventory reconciler for file migrations
//!
//! This library compares a source inventory (the files that should have been
//! copied) against destination snapshots (what actually arrived), streaming
//! the source through a pool of comparison workers and writing one line per
//! missing or inconsistent file.

pub mod compare;
pub mod config;
pub mod error;
pub mod index;
pub mod listing;
pub mod models;
pub mod path;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod seed;
pub mod sink;
pub mod source;
pub mod walk;

pub use config::{CompareMode, DestinationSpec, ReconcileConfig, SourceSchema};
pub use error::{ReconcileError, ReconcileErrorKind, Result};
pub use index::{DestinationIndex, IndexBuilder, IndexStats};
pub use models::{
    FileDescriptor, IndexEntry, LineCounts, MismatchReason, MismatchRecord, MismatchTally,
};
pub use pipeline::{reconcile, run_pipeline, ReconcileReport};
pub use progress::{ProgressReporter, RunPhase};
pub use recovery::{write_recovery_commands, RecoveryOptions};
pub use seed::write_seed_listing;
pub use source::SourceReader;
pub use walk::write_listing;
