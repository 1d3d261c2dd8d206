//! Reconciliation pipeline
//!
//! ```text
//! source file -> [reader thread] -> bounded queue -> [N compare workers] -> bounded queue -> [sink thread] -> output
//!                                                          |
//!                                               frozen DestinationIndex
//! ```
//!
//! The index is built before any thread starts. A source error travels down
//! both queues as an `Err` item, so the run ends with that error rather than
//! with a truncated but successful-looking output.

use log::info;
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::bounded;

use crate::compare::{run_pool, PoolStats};
use crate::config::{CompareMode, ReconcileConfig, QUEUE_CAPACITY};
use crate::error::Result;
use crate::index::{load_destination, DestinationIndex, IndexStats};
use crate::listing::{create_output, open_input};
use crate::models::MismatchTally;
use crate::progress::{ProgressReporter, RunPhase};
use crate::sink::spawn_sink;
use crate::source::{spawn_source, SourceReader, SourceStats};

/// Outcome of the concurrent stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub source: SourceStats,
    pub pool: PoolStats,
    pub written: u64,
    pub tally: MismatchTally,
}

/// Everything a finished run reports
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Destination index counters
    pub index: IndexStats,
    /// Source inventory counters
    pub source: SourceStats,
    /// Workers used
    pub workers: usize,
    /// Descriptors compared
    pub compared: u64,
    /// Mismatch lines written
    pub written: u64,
    /// Mismatch lines per reason
    pub tally: MismatchTally,
    /// Total run duration in milliseconds
    pub duration_ms: u64,
}

/// Stream `source` through `workers` comparison workers into `output`
///
/// Blocks until the producer, every worker, and the sink have finished.
pub fn run_pipeline<R, W>(
    index: &DestinationIndex,
    source: SourceReader<R>,
    mode: CompareMode,
    workers: usize,
    output: W,
) -> Result<PipelineOutcome>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let (result_tx, result_rx) = bounded(QUEUE_CAPACITY);

    let sink = spawn_sink(result_rx, output, Arc::clone(&cancel))?;
    let (descriptors, producer) = spawn_source(source, QUEUE_CAPACITY)?.into_parts();

    let pool = run_pool(descriptors, index, mode, workers, result_tx, &cancel);

    let sink_report = sink.wait();
    let source_stats = producer.join()?;
    let pool = pool?;
    let sink_report = sink_report?;

    Ok(PipelineOutcome {
        source: source_stats,
        pool,
        written: sink_report.written,
        tally: sink_report.tally,
    })
}

/// Run a full reconciliation as described by `config`
pub fn reconcile(config: &ReconcileConfig) -> Result<ReconcileReport> {
    let reporter = ProgressReporter::new(config.show_progress);
    let result = reconcile_with(config, &reporter);
    match &result {
        Ok(report) => reporter.report_done(report),
        Err(e) => reporter.report_error(e),
    }
    result
}

fn reconcile_with(
    config: &ReconcileConfig,
    reporter: &ProgressReporter,
) -> Result<ReconcileReport> {
    config.validate()?;
    let start = Instant::now();
    let workers = config.effective_workers();
    reporter.report_start(config);

    info!(
        "Reconciling {} against {} (mode={}, workers={})",
        config.source_path.display(),
        config.destination.path().display(),
        config.mode,
        workers
    );

    // Truncated before the index is built
    let output = create_output(&config.output_path)?;

    let (index, index_stats) = load_destination(&config.destination)?;
    reporter.report_phase(RunPhase::Index, index.len() as u64);

    let source = SourceReader::new(
        open_input(&config.source_path)?,
        config.source_schema,
        &config.base_dir,
        config.ignore_pattern(),
    )?
    .with_origin(&config.source_path);

    let outcome = run_pipeline(&index, source, config.mode, workers, output)?;
    reporter.report_phase(RunPhase::Compare, outcome.pool.compared);

    Ok(ReconcileReport {
        index: index_stats,
        source: outcome.source,
        workers: outcome.pool.workers,
        compared: outcome.pool.compared,
        written: outcome.written,
        tally: outcome.tally,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSchema;
    use crate::index::IndexBuilder;
    use crate::models::IndexEntry;
    use std::sync::Mutex;

    /// Writer whose contents stay reachable after the sink thread consumes it
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn index() -> DestinationIndex {
        let mut builder = IndexBuilder::new();
        builder.insert("/base/PJ/c/s/a.txt", IndexEntry::new(10, None));
        builder.insert("/base/PJ/c/s/b.txt", IndexEntry::new(20, None));
        builder.freeze()
    }

    #[test]
    fn test_run_pipeline_reports_mismatches() {
        let data = "\
\"PJ\",\"c\",\"s\",a.txt,10
\"PJ\",\"c\",\"s\",b.txt,21
\"PJ\",\"c\",\"s\",missing.txt,1
";
        let source =
            SourceReader::new(data.as_bytes(), SourceSchema::Project, "/base", None).unwrap();
        let buf = SharedBuf::default();
        let outcome =
            run_pipeline(&index(), source, CompareMode::SizeEqual, 2, buf.clone()).unwrap();

        assert_eq!(outcome.pool.compared, 3);
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.tally.size_mismatch, 1);
        assert_eq!(outcome.tally.non_existent, 1);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "ファイルなし,/base/PJ/c/s/missing.txt",
                "ファイルサイズ不一致,/base/PJ/c/s/b.txt",
            ]
        );
    }

    #[test]
    fn test_run_pipeline_fails_on_malformed_source_row() {
        let mut data = String::new();
        for i in 0..200 {
            data.push_str(&format!("\"PJ\",\"c\",\"s\",f{}.txt,1\n", i));
        }
        data.push_str("truncated,row\n");
        for i in 0..200 {
            data.push_str(&format!("\"PJ\",\"c\",\"s\",g{}.txt,1\n", i));
        }

        let source = SourceReader::new(
            std::io::Cursor::new(data),
            SourceSchema::Project,
            "/base",
            None,
        )
        .unwrap();
        let err = run_pipeline(&index(), source, CompareMode::SizeEqual, 4, std::io::sink())
            .unwrap_err();
        assert!(err.is_format());
        assert_eq!(err.line, Some(201));
    }

    #[test]
    fn test_run_pipeline_fails_on_unreadable_source_line() {
        let mut data = b"\"PJ\",\"c\",\"s\",a.txt,10\n".to_vec();
        data.extend_from_slice(b"\"PJ\",\"c\",\"s\",\x83\x65.txt,1\n");
        data.extend_from_slice(b"\"PJ\",\"c\",\"s\",missing.txt,1\n");

        let source = SourceReader::new(
            std::io::Cursor::new(data),
            SourceSchema::Project,
            "/base",
            None,
        )
        .unwrap();
        let err = run_pipeline(&index(), source, CompareMode::SizeEqual, 2, std::io::sink())
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ReconcileErrorKind::Io);
        assert_eq!(err.line, Some(2));
    }
}
