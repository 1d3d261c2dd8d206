//! Comparison policies and the worker pool that applies them

use chrono::NaiveDateTime;
use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::CompareMode;
use crate::error::Result;
use crate::index::DestinationIndex;
use crate::models::{FileDescriptor, IndexEntry, MismatchReason, MismatchRecord};
use crate::source::SourceItem;

/// Item carried by the mismatch queue; an `Err` is a terminal pipeline failure
pub type ResultItem = Result<MismatchRecord>;

fn epoch_seconds(t: Option<NaiveDateTime>) -> Option<i64> {
    t.map(|t| t.and_utc().timestamp())
}

impl CompareMode {
    /// Judge one descriptor against its destination entry
    ///
    /// Returns `None` when the file matches. A missing entry is always
    /// [`MismatchReason::NonExistent`]. Absent timestamps order before every
    /// real one.
    pub fn evaluate(
        &self,
        entry: Option<&IndexEntry>,
        file: &FileDescriptor,
    ) -> Option<MismatchReason> {
        let Some(entry) = entry else {
            return Some(MismatchReason::NonExistent);
        };

        match self {
            CompareMode::SizeEqual => {
                // The old snapshot size also counts as a match
                if entry.size != file.size && entry.size_old != Some(file.size) {
                    return Some(MismatchReason::SizeMismatch);
                }
            }
            CompareMode::SizeGreaterOrEqual => {
                if entry.size < file.size {
                    return Some(MismatchReason::SizeShrink);
                }
            }
            CompareMode::SizeGreaterOrEqualAndModifiedAfter => {
                if entry.size < file.size {
                    return Some(MismatchReason::SizeShrink);
                }
                if epoch_seconds(entry.modified_at) <= epoch_seconds(file.modified_at) {
                    return Some(MismatchReason::ModifiedTimeInvalid);
                }
            }
        }
        None
    }
}

/// Counters from a pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    /// Descriptors evaluated
    pub compared: u64,
    /// Mismatches handed to the sink
    pub mismatches: u64,
}

/// Run `workers` comparison workers until the descriptor queue is drained
///
/// Every descriptor is claimed by exactly one worker. Mismatches go to
/// `results`; a source error is forwarded to `results` and raises `cancel`,
/// after which workers stop pulling. Both channel ends are dropped before
/// returning, which closes the mismatch queue.
pub fn run_pool(
    descriptors: Receiver<SourceItem>,
    index: &DestinationIndex,
    mode: CompareMode,
    workers: usize,
    results: Sender<ResultItem>,
    cancel: &AtomicBool,
) -> Result<PoolStats> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("compare-{}", i))
        .build()?;

    let compared = AtomicU64::new(0);
    let mismatches = AtomicU64::new(0);

    pool.scope(|scope| {
        for id in 0..workers {
            let descriptors = descriptors.clone();
            let results = results.clone();
            let compared = &compared;
            let mismatches = &mismatches;
            scope.spawn(move |_| {
                let (seen, found) = worker(id, &descriptors, index, mode, &results, cancel);
                compared.fetch_add(seen, Ordering::Relaxed);
                mismatches.fetch_add(found, Ordering::Relaxed);
            });
        }
    });
    drop(descriptors);
    drop(results);

    Ok(PoolStats {
        workers,
        compared: compared.load(Ordering::Relaxed),
        mismatches: mismatches.load(Ordering::Relaxed),
    })
}

fn worker(
    id: usize,
    descriptors: &Receiver<SourceItem>,
    index: &DestinationIndex,
    mode: CompareMode,
    results: &Sender<ResultItem>,
    cancel: &AtomicBool,
) -> (u64, u64) {
    let mut seen = 0;
    let mut found = 0;

    for item in descriptors.iter() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match item {
            Ok(file) => {
                seen += 1;
                if let Some(reason) = mode.evaluate(index.get(&file.path), &file) {
                    found += 1;
                    if results.send(Ok(MismatchRecord::new(file.path, reason))).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                let _ = results.send(Err(e));
                break;
            }
        }
    }

    debug!("compare worker {} finished: compared={}, mismatches={}", id, seen, found);
    (seen, found)
}
