//! Source inventory streaming
//!
//! [`SourceReader`] turns a source inventory into a lazy sequence of
//! [`FileDescriptor`]s, applying the skip rules of each schema. The reader is
//! fused: after the input ends or a row fails to parse it yields nothing more.
//! [`spawn_source`] runs a reader on its own thread feeding a bounded queue.

use crossbeam_channel::{bounded, Receiver};
use log::{error, info};
use serde::Serialize;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::config::{SourceSchema, LOCK_FILE_SIZE_THRESHOLD};
use crate::error::{ReconcileError, Result};
use crate::listing::{numbered_lines, ListingRow, NumberedLines, ProjectRow};
use crate::models::FileDescriptor;
use crate::path;

/// Item carried by the descriptor queue; an `Err` is terminal
pub type SourceItem = Result<FileDescriptor>;

/// Office lock-file name prefix
const LOCK_FILE_PREFIX: &str = "~$";

/// Explorer thumbnail cache, never part of an inventory
const THUMBNAIL_CACHE: &str = "Thumbs.db";

/// Counters from one pass over the source inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Lines read
    pub read: u64,
    /// Descriptors produced
    pub added: u64,
    /// Rows dropped by the ignore substring
    pub skipped_ignored: u64,
    /// Folder rows
    pub skipped_folders: u64,
    /// Transient lock files and thumbnail caches
    pub skipped_invalid: u64,
    /// Blank lines
    pub skipped_blank: u64,
}

impl SourceStats {
    /// Total rows that did not produce a descriptor
    pub fn skipped(&self) -> u64 {
        self.skipped_ignored + self.skipped_folders + self.skipped_invalid + self.skipped_blank
    }
}

/// Lazy, non-restartable descriptor sequence over a source inventory
pub struct SourceReader<R> {
    lines: NumberedLines<BufReader<R>>,
    schema: SourceSchema,
    prefix: String,
    ignore: Option<String>,
    origin: Option<PathBuf>,
    stats: SourceStats,
    finished: bool,
}

impl<R: Read> SourceReader<R> {
    /// Create a reader; `base_dir` is only used by the project schema
    pub fn new(
        reader: R,
        schema: SourceSchema,
        base_dir: &str,
        ignore: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            lines: numbered_lines(reader)?,
            schema,
            prefix: path::normalize_prefix(base_dir),
            ignore: ignore.filter(|s| !s.is_empty()).map(str::to_string),
            origin: None,
            stats: SourceStats::default(),
            finished: false,
        })
    }

    /// Name the file being read, for error messages
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Counters so far
    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn is_ignored(&self, raw: &str) -> bool {
        self.ignore.as_deref().is_some_and(|pattern| raw.contains(pattern))
    }

    fn project_row(&mut self, line_no: u64, text: &str) -> Result<Option<FileDescriptor>> {
        let row = ProjectRow::parse(line_no, text)?;
        if self.is_ignored(row.path_segment()) {
            self.stats.skipped_ignored += 1;
            return Ok(None);
        }
        Ok(Some(FileDescriptor::new(row.full_path(&self.prefix), row.size)))
    }

    fn listing_row(&mut self, line_no: u64, text: &str) -> Result<Option<FileDescriptor>> {
        let row = ListingRow::parse(line_no, text)?;
        if row.is_folder {
            self.stats.skipped_folders += 1;
            return Ok(None);
        }
        if is_transient(&row.name, row.size) {
            self.stats.skipped_invalid += 1;
            return Ok(None);
        }
        if self.is_ignored(&row.raw_path) {
            self.stats.skipped_ignored += 1;
            return Ok(None);
        }
        Ok(Some(
            FileDescriptor::new(row.path, row.size).with_modified(row.modified_at),
        ))
    }

    fn fail(&mut self, err: ReconcileError) -> Option<SourceItem> {
        self.finished = true;
        Some(Err(match &self.origin {
            Some(origin) => err.with_path(origin),
            None => err,
        }))
    }
}

/// Lock files below the threshold and thumbnail caches are not real content
fn is_transient(name: &str, size: u64) -> bool {
    (name.starts_with(LOCK_FILE_PREFIX) && size < LOCK_FILE_SIZE_THRESHOLD)
        || name == THUMBNAIL_CACHE
}

impl<R: Read> Iterator for SourceReader<R> {
    type Item = SourceItem;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let (line_no, text) = match self.lines.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => return self.fail(e),
                Some(Ok(line)) => line,
            };
            self.stats.read += 1;

            if text.is_empty() {
                self.stats.skipped_blank += 1;
                continue;
            }

            let parsed = match self.schema {
                SourceSchema::Project => self.project_row(line_no, &text),
                SourceSchema::Listing => self.listing_row(line_no, &text),
            };
            match parsed {
                Ok(Some(descriptor)) => {
                    self.stats.added += 1;
                    return Some(Ok(descriptor));
                }
                Ok(None) => continue,
                Err(e) => return self.fail(e),
            }
        }
        None
    }
}

/// A source reader running on its own thread
pub struct SourceStream {
    receiver: Receiver<SourceItem>,
    handle: JoinHandle<SourceStats>,
}

impl SourceStream {
    /// Split into the queue receiver and the producer handle
    pub fn into_parts(self) -> (Receiver<SourceItem>, SourceProducer) {
        (self.receiver, SourceProducer(self.handle))
    }
}

/// Handle on the producer thread
pub struct SourceProducer(JoinHandle<SourceStats>);

impl SourceProducer {
    /// Wait for the producer and return its counters
    pub fn join(self) -> Result<SourceStats> {
        self.0
            .join()
            .map_err(|_| ReconcileError::pipeline("source reader thread panicked"))
    }
}

/// Start a producer thread draining `reader` into a queue of `capacity`
///
/// A parse or read error is sent downstream as the last item. The producer also
/// stops once every receiver has been dropped.
pub fn spawn_source<R>(mut reader: SourceReader<R>, capacity: usize) -> Result<SourceStream>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded::<SourceItem>(capacity);

    let handle = thread::Builder::new()
        .name("source-reader".into())
        .spawn(move || {
            for item in reader.by_ref() {
                if let Err(e) = &item {
                    error!("Source inventory read failed: {}", e);
                }
                if tx.send(item).is_err() {
                    break;
                }
            }

            let stats = reader.stats();
            info!(
                "Source inventory streamed: read={}, queued={}, skipped={} (ignored={}, folders={}, invalid={})",
                stats.read,
                stats.added,
                stats.skipped(),
                stats.skipped_ignored,
                stats.skipped_folders,
                stats.skipped_invalid
            );
            stats
        })?;

    Ok(SourceStream {
        receiver: rx,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileErrorKind;

    fn collect(data: &str, schema: SourceSchema, ignore: Option<&str>) -> Vec<SourceItem> {
        SourceReader::new(data.as_bytes(), schema, r"C:\base", ignore)
            .unwrap()
            .collect()
    }

    #[test]
    fn test_project_rows() {
        let data = "\
\"PJ1\",\"cat\",\"sub\",a.txt,10
\"PJ1\",\"cat\",\"sub\",tmp\\b.txt,20

\"PJ2\",\"cat\",\"sub\",c.txt,30
";
        let mut reader =
            SourceReader::new(data.as_bytes(), SourceSchema::Project, r"C:\base", Some("tmp"))
                .unwrap();
        let items: Vec<FileDescriptor> = reader.by_ref().map(|i| i.unwrap()).collect();
        assert_eq!(
            items,
            vec![
                FileDescriptor::new("C:/base/PJ1/cat/sub/a.txt", 10),
                FileDescriptor::new("C:/base/PJ2/cat/sub/c.txt", 30),
            ]
        );

        let stats = reader.stats();
        assert_eq!(stats.read, 4);
        assert_eq!(stats.added, 2);
        assert_eq!(stats.skipped_ignored, 1);
        assert_eq!(stats.skipped_blank, 1);
    }

    #[test]
    fn test_listing_rows_filters() {
        let data = "\
\"dir\",\"C:\\src\\dir\",\"\",0,TRUE,2024/01/01,00:00:00
\"~$report.xlsx\",\"C:\\src\\~$report.xlsx\",\"xlsx\",150,FALSE,2024/01/01,00:00:00
\"~$big.xlsx\",\"C:\\src\\~$big.xlsx\",\"xlsx\",5000,FALSE,2024/01/01,00:00:00
\"Thumbs.db\",\"C:\\src\\Thumbs.db\",\"db\",90000,FALSE,2024/01/01,00:00:00
\"keep.txt\",\"C:\\src\\backup\\keep.txt\",\"txt\",1,FALSE,2024/01/01,00:00:00
";
        let mut reader =
            SourceReader::new(data.as_bytes(), SourceSchema::Listing, "", Some("backup")).unwrap();
        let items: Vec<FileDescriptor> = reader.by_ref().map(|i| i.unwrap()).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "C:/src/~$big.xlsx");
        assert_eq!(items[0].size, 5000);
        assert!(items[0].modified_at.is_some());

        let stats = reader.stats();
        assert_eq!(stats.skipped_folders, 1);
        assert_eq!(stats.skipped_invalid, 2);
        assert_eq!(stats.skipped_ignored, 1);
    }

    #[test]
    fn test_lock_file_threshold() {
        assert!(is_transient("~$report.xlsx", 150));
        assert!(!is_transient("~$report.xlsx", 5000));
        assert!(!is_transient("report.xlsx", 10));
        assert!(is_transient("Thumbs.db", 1 << 20));
    }

    #[test]
    fn test_error_terminates_sequence() {
        let data = "\
\"PJ1\",\"cat\",\"sub\",a.txt,10
broken,row
\"PJ1\",\"cat\",\"sub\",c.txt,30
";
        let items = collect(data, SourceSchema::Project, None);
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_format());
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_unreadable_line_ends_stream_with_io_error() {
        let mut data = b"\"PJ1\",\"cat\",\"sub\",a.txt,10\n".to_vec();
        data.extend_from_slice(b"\"PJ1\",\"cat\",\"sub\",\x83\x65.txt,20\n");
        data.extend_from_slice(b"\"PJ1\",\"cat\",\"sub\",c.txt,30\n");

        let items: Vec<SourceItem> =
            SourceReader::new(data.as_slice(), SourceSchema::Project, "/b", None)
                .unwrap()
                .collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.kind, ReconcileErrorKind::Io);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_origin_attached_to_errors() {
        let reader = SourceReader::new("x,y".as_bytes(), SourceSchema::Project, "/b", None)
            .unwrap()
            .with_origin("source.csv");
        let items: Vec<SourceItem> = reader.collect();
        let err = items[0].as_ref().unwrap_err();
        assert_eq!(err.path, Some(PathBuf::from("source.csv")));
    }

    #[test]
    fn test_spawn_source_delivers_everything() {
        let mut data = String::new();
        for i in 0..500 {
            data.push_str(&format!("\"PJ\",\"c\",\"s\",f{}.txt,{}\n", i, i));
        }
        let reader =
            SourceReader::new(std::io::Cursor::new(data), SourceSchema::Project, "/b", None)
                .unwrap();
        let (rx, producer) = spawn_source(reader, 4).unwrap().into_parts();
        let received: Vec<FileDescriptor> = rx.iter().map(|i| i.unwrap()).collect();
        let stats = producer.join().unwrap();
        assert_eq!(received.len(), 500);
        assert_eq!(stats.added, 500);
        assert_eq!(received[499].path, "/b/PJ/c/s/f499.txt");
    }
}
