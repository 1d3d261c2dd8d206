//! Directory listing producer
//!
//! Walks a directory tree and writes one listing row per entry, in the same
//! layout the destination index reads back.

use chrono::{DateTime, Local};
use log::{debug, info};
use std::io::{BufWriter, Write};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{ReconcileError, Result};
use crate::listing::format_listing_row;

/// Write a listing of everything under `base_dir` (the root itself excluded)
///
/// Every `verbose` rows a progress line is logged; `0` disables it.
/// Returns the number of rows written.
pub fn write_listing<W: Write>(base_dir: &Path, writer: W, verbose: u64) -> Result<u64> {
    if !base_dir.is_dir() {
        return Err(ReconcileError::config(format!(
            "not a directory: {}",
            base_dir.display()
        ))
        .with_path(base_dir));
    }

    let mut out = BufWriter::new(writer);
    let mut written = 0u64;

    for entry in WalkDir::new(base_dir).min_depth(1).follow_links(false) {
        let entry = entry?;
        let metadata = entry
            .metadata()
            .map_err(|e| ReconcileError::from(e).with_path(entry.path()))?;

        let name = entry.file_name().to_string_lossy();
        let full_path = entry.path().to_string_lossy();
        let extension = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        let (date, time) = match metadata.modified() {
            Ok(mtime) => {
                let local: DateTime<Local> = mtime.into();
                (
                    local.format("%Y/%m/%d").to_string(),
                    local.format("%H:%M:%S").to_string(),
                )
            }
            Err(e) => {
                debug!("No modification time for {}: {}", entry.path().display(), e);
                (String::new(), String::new())
            }
        };

        let line = format_listing_row(
            &name,
            &full_path,
            &extension,
            metadata.len(),
            metadata.is_dir(),
            &date,
            &time,
        );
        writeln!(out, "{}", line)?;
        written += 1;

        if verbose > 0 && written % verbose == 0 {
            info!("{} entries listed", written);
        }
    }

    out.flush()?;
    info!("Listing complete: {} entries under {}", written, base_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingRow;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_listing_round_trips_through_parser() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.bin"), b"123").unwrap();

        let mut out = Vec::new();
        let written = write_listing(dir.path(), &mut out, 1).unwrap();
        assert_eq!(written, 3);

        let text = String::from_utf8(out).unwrap();
        let rows: Vec<ListingRow> = text
            .lines()
            .enumerate()
            .map(|(i, l)| ListingRow::parse(i as u64 + 1, l).unwrap())
            .collect();

        let folder = rows.iter().find(|r| r.name == "sub").unwrap();
        assert!(folder.is_folder);

        let file = rows.iter().find(|r| r.name == "a.txt").unwrap();
        assert!(!file.is_folder);
        assert_eq!(file.size, 5);
        assert_eq!(file.extension, "txt");
        assert!(file.modified_at.is_some());
        assert!(file.path.ends_with("sub/a.txt"));
    }

    #[test]
    fn test_write_listing_empty_dir() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();
        assert_eq!(write_listing(dir.path(), &mut out, 0).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_listing_rejects_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = write_listing(&dir.path().join("nope"), Vec::new(), 0).unwrap_err();
        assert_eq!(err.kind, crate::error::ReconcileErrorKind::Config);
    }
}
