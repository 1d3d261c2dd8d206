//! Destination index construction
//!
//! The index is assembled by an [`IndexBuilder`] and then frozen into a
//! [`DestinationIndex`], which only offers lookups. Workers share the frozen
//! value by reference, so no locking is involved once comparison starts.

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;

use crate::config::DestinationSpec;
use crate::error::Result;
use crate::listing::{numbered_lines, open_input, CloudRow, ListingRow};
use crate::models::IndexEntry;
use crate::path;

/// Read-only lookup of destination files keyed by case-folded path
#[derive(Debug, Default)]
pub struct DestinationIndex {
    entries: HashMap<String, IndexEntry>,
}

impl DestinationIndex {
    /// Look up a path (any spelling; it is normalized here)
    pub fn get(&self, raw_path: &str) -> Option<&IndexEntry> {
        self.entries.get(&path::key(raw_path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable index under construction
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: HashMap<String, IndexEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a path
    pub fn insert(&mut self, raw_path: &str, entry: IndexEntry) {
        self.entries.insert(path::key(raw_path), entry);
    }

    /// Record old-snapshot metadata on an existing entry; returns false if absent
    pub fn amend_old(
        &mut self,
        raw_path: &str,
        size: u64,
        modified_at: Option<NaiveDateTime>,
    ) -> bool {
        match self.entries.get_mut(&path::key(raw_path)) {
            Some(entry) => {
                entry.size_old = Some(size);
                entry.modified_at_old = modified_at;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finish construction
    pub fn freeze(self) -> DestinationIndex {
        DestinationIndex {
            entries: self.entries,
        }
    }
}

/// Counters from one pass over a destination snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Lines read, header and blank lines included
    pub read: u64,
    /// Entries inserted (primary pass) or amended (old pass)
    pub added: u64,
    /// Folder rows, header and blank lines
    pub skipped: u64,
    /// Rows whose timestamp could not be parsed
    pub timestamp_fallbacks: u64,
}

/// Load a primary listing snapshot into `builder`
pub fn load_listing<R: Read>(builder: &mut IndexBuilder, reader: R) -> Result<IndexStats> {
    let mut stats = IndexStats::default();

    for line in numbered_lines(reader)? {
        let (line_no, text) = line?;
        stats.read += 1;
        if text.is_empty() {
            stats.skipped += 1;
            continue;
        }

        let row = ListingRow::parse(line_no, &text)?;
        if row.is_folder {
            stats.skipped += 1;
            continue;
        }
        if row.modified_at.is_none() {
            stats.timestamp_fallbacks += 1;
        }

        builder.insert(&row.path, IndexEntry::new(row.size, row.modified_at));
        stats.added += 1;
    }

    if stats.timestamp_fallbacks > 0 {
        warn!(
            "{} destination rows have an unparsable timestamp and count as oldest",
            stats.timestamp_fallbacks
        );
    }
    info!(
        "Destination listing loaded: read={}, indexed={}, skipped={}",
        stats.read, stats.added, stats.skipped
    );
    Ok(stats)
}

/// Amend entries already in `builder` with sizes and times from an old listing
///
/// Rows whose path is not indexed are ignored; no entry is ever inserted here.
pub fn merge_old_listing<R: Read>(builder: &mut IndexBuilder, reader: R) -> Result<IndexStats> {
    let mut stats = IndexStats::default();

    for line in numbered_lines(reader)? {
        let (line_no, text) = line?;
        stats.read += 1;
        if text.is_empty() {
            stats.skipped += 1;
            continue;
        }

        let row = ListingRow::parse(line_no, &text)?;
        if row.is_folder {
            stats.skipped += 1;
            continue;
        }
        if row.modified_at.is_none() {
            stats.timestamp_fallbacks += 1;
        }

        if builder.amend_old(&row.path, row.size, row.modified_at) {
            stats.added += 1;
        }
    }

    info!(
        "Old destination listing merged: read={}, updated={}, skipped={}",
        stats.read, stats.added, stats.skipped
    );
    Ok(stats)
}

/// Load a cloud export into `builder`
///
/// The first line is a header. Paths are rebuilt as `prefix` + `parent/name`
/// with `strip` removed.
pub fn load_cloud_listing<R: Read>(
    builder: &mut IndexBuilder,
    reader: R,
    prefix: &str,
    strip: Option<&str>,
) -> Result<IndexStats> {
    let mut stats = IndexStats::default();
    let prefix = path::normalize_prefix(prefix);

    for line in numbered_lines(reader)? {
        let (line_no, text) = line?;
        stats.read += 1;
        if line_no == 1 || text.is_empty() {
            stats.skipped += 1;
            continue;
        }

        let row = CloudRow::parse(line_no, &text)?;
        if row.is_folder {
            stats.skipped += 1;
            continue;
        }

        builder.insert(
            &row.full_path(&prefix, strip),
            IndexEntry::new(row.size, Some(row.modified_at)),
        );
        stats.added += 1;
    }

    info!(
        "Cloud destination export loaded: read={}, indexed={}, skipped={}",
        stats.read, stats.added, stats.skipped
    );
    Ok(stats)
}

/// Build an index from a primary listing and an optional old listing
pub fn build_from_listings<R: Read, O: Read>(
    primary: R,
    old: Option<O>,
) -> Result<(DestinationIndex, IndexStats)> {
    let mut builder = IndexBuilder::new();
    let stats = load_listing(&mut builder, primary)?;
    if let Some(old) = old {
        merge_old_listing(&mut builder, old)?;
    }
    Ok((builder.freeze(), stats))
}

/// Open the files named by `spec` and build the index they describe
pub fn load_destination(spec: &DestinationSpec) -> Result<(DestinationIndex, IndexStats)> {
    let mut builder = IndexBuilder::new();
    let stats = match spec {
        DestinationSpec::Listing { path, old_path } => {
            let stats =
                load_listing(&mut builder, open_input(path)?).map_err(|e| e.with_path(path))?;
            if let Some(old_path) = old_path {
                merge_old_listing(&mut builder, open_input(old_path)?)
                    .map_err(|e| e.with_path(old_path))?;
            }
            stats
        }
        DestinationSpec::Cloud {
            path,
            prefix,
            strip,
        } => load_cloud_listing(&mut builder, open_input(path)?, prefix, strip.as_deref())
            .map_err(|e| e.with_path(path))?,
    };
    Ok((builder.freeze(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    const PRIMARY: &str = "\
\"a\",\"C:\\data\",\"\",0,TRUE,2024/01/01,00:00:00
\"b.txt\",\"C:\\data\\B.txt\",\"txt\",100,FALSE,2024/01/02,10:00:00

\"c.txt\",\"C:\\data\\c.txt\",\"txt\",5,FALSE,bad,10:00:00
";

    #[test]
    fn test_load_listing_skips_folders_and_blank_lines() {
        let mut builder = IndexBuilder::new();
        let stats = load_listing(&mut builder, PRIMARY.as_bytes()).unwrap();
        assert_eq!(stats.read, 4);
        assert_eq!(stats.added, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.timestamp_fallbacks, 1);

        let index = builder.freeze();
        assert_eq!(index.len(), 2);
        assert!(index.get("C:/data").is_none());
        let b = index.get("c:/DATA/b.TXT").unwrap();
        assert_eq!(b.size, 100);
        assert_eq!(b.modified_at, Some(ts(2024, 1, 2, 10)));
        assert_eq!(index.get("C:/data/c.txt").unwrap().modified_at, None);
    }

    #[test]
    fn test_load_listing_rejects_malformed_row() {
        let data = "\"b.txt\",\"C:\\data\\b.txt\",\"txt\",100,FALSE\n";
        let mut builder = IndexBuilder::new();
        let err = load_listing(&mut builder, data.as_bytes()).unwrap_err();
        assert!(err.is_format());
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_merge_old_only_amends_existing() {
        let old = "\
\"b.txt\",\"C:\\data\\b.txt\",\"txt\",90,FALSE,2024/01/01,08:00:00
\"new.txt\",\"C:\\data\\new.txt\",\"txt\",1,FALSE,2024/01/01,08:00:00
";
        let (index, _) = build_from_listings(PRIMARY.as_bytes(), Some(old.as_bytes())).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.get("C:/data/new.txt").is_none());

        let b = index.get("C:/data/b.txt").unwrap();
        assert_eq!(b.size, 100);
        assert_eq!(b.size_old, Some(90));
        assert_eq!(b.modified_at_old, Some(ts(2024, 1, 1, 8)));

        let c = index.get("C:/data/c.txt").unwrap();
        assert!(!c.has_old());
    }

    #[test]
    fn test_cloud_listing() {
        let data = "\u{FEFF}名前,更新日時,更新者,サイズ,種類,パス
b.txt,\"2024/01/02 1:00:00\",someone,\"512\",\"File\",sites/pj/Shared Documents/a
a,\"2024/01/02 1:00:00\",someone,\"0\",\"Folder\",sites/pj/Shared Documents
";
        let mut builder = IndexBuilder::new();
        let stats = load_cloud_listing(
            &mut builder,
            data.as_bytes(),
            r"C:\base",
            Some("sites/pj/Shared Documents/"),
        )
        .unwrap();
        assert_eq!(stats.read, 3);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 2);

        let index = builder.freeze();
        let entry = index.get("C:/base/a/b.txt").unwrap();
        assert_eq!(entry.size, 512);
        assert_eq!(entry.modified_at, Some(ts(2024, 1, 2, 10)));
    }

    #[test]
    fn test_load_destination_from_files() {
        let mut primary = tempfile::NamedTempFile::new().unwrap();
        primary.write_all(PRIMARY.as_bytes()).unwrap();

        let spec = DestinationSpec::Listing {
            path: primary.path().to_path_buf(),
            old_path: None,
        };
        let (index, stats) = load_destination(&spec).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(stats.added, 2);
    }

    #[test]
    fn test_load_destination_missing_file() {
        let spec = DestinationSpec::Listing {
            path: "/nonexistent/dest.csv".into(),
            old_path: None,
        };
        let err = load_destination(&spec).unwrap_err();
        assert_eq!(err.kind, crate::error::ReconcileErrorKind::Io);
        assert_eq!(err.path, Some("/nonexistent/dest.csv".into()));
    }
}
