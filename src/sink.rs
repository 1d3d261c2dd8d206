//! Result sink: the single consumer of the mismatch queue

use crossbeam_channel::Receiver;
use log::{error, info};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::compare::ResultItem;
use crate::error::{ReconcileError, Result};
use crate::models::MismatchTally;

/// What the sink wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    /// Lines written
    pub written: u64,
    /// Lines written per reason; always sums to `written`
    pub tally: MismatchTally,
}

/// Write every record from `results` to `writer` as `<label>,<path>` lines
///
/// The queue is drained until closed even after a failure, so producers never
/// block on a full queue. The first failure (a forwarded pipeline error or a
/// write error) raises `cancel`, stops further writes, and is returned once the
/// queue closes. Whatever was written before is flushed, not rolled back.
pub fn drain_results<W: Write>(
    results: &Receiver<ResultItem>,
    writer: W,
    cancel: &AtomicBool,
) -> Result<SinkReport> {
    let mut out = BufWriter::new(writer);
    let mut report = SinkReport::default();
    let mut failure: Option<ReconcileError> = None;

    for item in results.iter() {
        if failure.is_some() {
            continue;
        }
        match item {
            Ok(record) => match writeln!(out, "{}", record.to_line()) {
                Ok(()) => {
                    report.written += 1;
                    report.tally.record(record.reason);
                }
                Err(e) => {
                    error!("Failed to write mismatch record: {}", e);
                    cancel.store(true, Ordering::Relaxed);
                    failure = Some(e.into());
                }
            },
            Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                failure = Some(e);
            }
        }
    }

    if let Err(e) = out.flush() {
        if failure.is_none() {
            failure = Some(e.into());
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    info!(
        "Mismatch output written: total={}, non_existent={}, size_mismatch={}, size_shrink={}, modified_time_invalid={}",
        report.written,
        report.tally.non_existent,
        report.tally.size_mismatch,
        report.tally.size_shrink,
        report.tally.modified_time_invalid
    );
    Ok(report)
}

/// A sink running on its own thread
pub struct ResultSink {
    handle: JoinHandle<Result<SinkReport>>,
}

impl ResultSink {
    /// Block until the sink has drained and flushed everything
    pub fn wait(self) -> Result<SinkReport> {
        self.handle
            .join()
            .map_err(|_| ReconcileError::pipeline("result sink thread panicked"))?
    }
}

/// Start the sink thread
pub fn spawn_sink<W>(
    results: Receiver<ResultItem>,
    writer: W,
    cancel: Arc<AtomicBool>,
) -> Result<ResultSink>
where
    W: Write + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("result-sink".into())
        .spawn(move || drain_results(&results, writer, &cancel))?;
    Ok(ResultSink { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MismatchReason, MismatchRecord};
    use crossbeam_channel::bounded;
    use std::io;

    #[test]
    fn test_drain_writes_lines_and_tallies() {
        let (tx, rx) = bounded(4);
        tx.send(Ok(MismatchRecord::new("/a/c.txt", MismatchReason::NonExistent)))
            .unwrap();
        tx.send(Ok(MismatchRecord::new("/a/d.txt", MismatchReason::SizeMismatch)))
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let report = drain_results(&rx, &mut out, &cancel).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ファイルなし,/a/c.txt\nファイルサイズ不一致,/a/d.txt\n"
        );
        assert_eq!(report.written, 2);
        assert_eq!(report.tally.total(), report.written);
        assert_eq!(report.tally.non_existent, 1);
        assert_eq!(report.tally.size_mismatch, 1);
        assert!(!cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn test_drain_surfaces_pipeline_error_after_draining() {
        let (tx, rx) = bounded(4);
        tx.send(Ok(MismatchRecord::new("/a", MismatchReason::NonExistent)))
            .unwrap();
        tx.send(Err(ReconcileError::format(7, "bad row"))).unwrap();
        tx.send(Ok(MismatchRecord::new("/b", MismatchReason::NonExistent)))
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let err = drain_results(&rx, &mut out, &cancel).unwrap_err();

        assert!(err.is_format());
        assert!(cancel.load(Ordering::Relaxed));
        assert!(rx.is_empty());
        assert_eq!(String::from_utf8(out).unwrap(), "ファイルなし,/a\n");
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (tx, rx) = bounded(4);
        tx.send(Ok(MismatchRecord::new("/a", MismatchReason::NonExistent)))
            .unwrap();
        drop(tx);

        let cancel = AtomicBool::new(false);
        let err = drain_results(&rx, FailingWriter, &cancel).unwrap_err();
        assert_eq!(err.kind, crate::error::ReconcileErrorKind::Io);
    }

    #[test]
    fn test_spawned_sink_completes_when_queue_closes() {
        let (tx, rx) = bounded(2);
        let sink = spawn_sink(rx, io::sink(), Arc::new(AtomicBool::new(false))).unwrap();
        for i in 0..10 {
            tx.send(Ok(MismatchRecord::new(format!("/f{}", i), MismatchReason::SizeShrink)))
                .unwrap();
        }
        drop(tx);
        let report = sink.wait().unwrap();
        assert_eq!(report.written, 10);
        assert_eq!(report.tally.size_shrink, 10);
    }
}
