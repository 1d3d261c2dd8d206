//! Synthetic listing generation from a project inventory
//!
//! Produces a Windows-style listing (backslash paths, CRLF line ends) for the
//! files a project inventory names, borrowing timestamps from a destination
//! index when one is given.

use chrono::NaiveDateTime;
use log::info;
use std::io::{BufWriter, Read, Write};

use crate::error::Result;
use crate::index::DestinationIndex;
use crate::listing::{format_listing_row, numbered_lines, ProjectRow};
use crate::models::LineCounts;
use crate::path;

/// Date written when no timestamp is known
pub const PLACEHOLDER_DATE: &str = "2022/3/5";

/// Time written when no timestamp is known
pub const PLACEHOLDER_TIME: &str = "15:04:05";

/// Timestamp to write for `full_path`: the old snapshot's when the index has
/// one, otherwise the primary snapshot's
fn timestamp_for(index: Option<&DestinationIndex>, full_path: &str) -> Option<NaiveDateTime> {
    let entry = index?.get(full_path)?;
    if entry.has_old() {
        entry.modified_at_old
    } else {
        entry.modified_at
    }
}

/// Split a normalized path into `(name, extension)`
fn name_and_extension(full_path: &str) -> (&str, &str) {
    let name = full_path.rsplit('/').next().unwrap_or(full_path);
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    (name, ext)
}

/// Write one listing row per project row in `source`
pub fn write_seed_listing<R: Read, W: Write>(
    source: R,
    base_dir: &str,
    index: Option<&DestinationIndex>,
    output: W,
) -> Result<LineCounts> {
    let prefix = path::normalize_prefix(base_dir);
    let mut out = BufWriter::new(output);
    let mut counts = LineCounts::default();

    for line in numbered_lines(source)? {
        let (line_no, text) = line?;
        counts.read += 1;
        if text.trim().is_empty() {
            continue;
        }

        let row = ProjectRow::parse(line_no, &text)?;
        let full_path = row.full_path(&prefix);
        let (name, ext) = name_and_extension(&full_path);

        let (date, time) = match timestamp_for(index, &full_path) {
            Some(ts) => (
                ts.format("%Y/%m/%d").to_string(),
                ts.format("%-H:%M:%S").to_string(),
            ),
            None => (PLACEHOLDER_DATE.to_string(), PLACEHOLDER_TIME.to_string()),
        };

        let line = format_listing_row(
            name,
            &full_path.replace('/', "\\"),
            ext,
            row.size,
            false,
            &date,
            &time,
        );
        write!(out, "{}\r\n", line)?;
        counts.written += 1;
    }

    out.flush()?;
    info!(
        "Synthetic listing written: read={}, written={}",
        counts.read, counts.written
    );
    Ok(counts)
}
