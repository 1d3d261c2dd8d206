//! Schema-aware parsers for the inventory CSV formats
//!
//! Three line formats are understood:
//!
//! - listing (7 fields), produced by the `list` command and by Windows file
//!   inventory tools: `"<name>","<full path>","<ext>",<size>,<TRUE|FALSE>,<YYYY/MM/DD>,<HH:MM:SS>`
//! - cloud (6 fields), a document-library export with a header row:
//!   `<name>,"<date> <time>",<author>,"<size>","<File|Folder>",<parent folder>`
//! - project (5 fields), the expected-file list:
//!   `"<project>","<category>","<subcategory>",<path segment>,<size>`
//!
//! Fields are split on every `,`; none of the formats escape commas. A row with
//! the wrong field count is a format error, never skipped.

use chrono::{NaiveDateTime, TimeDelta};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;

use crate::error::{ReconcileError, Result};
use crate::path;

/// Field count of a listing row
pub const LISTING_FIELDS: usize = 7;

/// Field count of a cloud export row
pub const CLOUD_FIELDS: usize = 6;

/// Field count of a project row
pub const PROJECT_FIELDS: usize = 5;

/// Hours added to cloud export timestamps (exports are in UTC, listings in JST)
pub const CLOUD_TIME_OFFSET_HOURS: i64 = 9;

/// Date/time layout shared by all formats
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Open an input file, naming it in the error on failure
pub fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| ReconcileError::from(e).with_path(path))
}

/// Create (or truncate) an output file, naming it in the error on failure
pub fn create_output(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| ReconcileError::from(e).with_path(path))
}

/// Line iterator yielding `(line_number, line)` with a leading BOM removed
pub struct NumberedLines<R> {
    lines: Lines<R>,
    line: u64,
}

/// Wrap a reader into a [`NumberedLines`] iterator
pub fn numbered_lines<R: Read>(reader: R) -> Result<NumberedLines<BufReader<R>>> {
    let mut reader = BufReader::new(reader);
    skip_bom(&mut reader)?;
    Ok(NumberedLines {
        lines: reader.lines(),
        line: 0,
    })
}

fn skip_bom<R: BufRead>(reader: &mut R) -> Result<()> {
    let head = reader.fill_buf()?;
    if head.starts_with(&UTF8_BOM) {
        reader.consume(UTF8_BOM.len());
    }
    Ok(())
}

impl<R: BufRead> Iterator for NumberedLines<R> {
    type Item = Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.lines.next()?;
        self.line += 1;
        let line = self.line;
        Some(
            next.map(|text| (line, text))
                .map_err(|e| ReconcileError::from(e).at_line(line)),
        )
    }
}

fn split_fields(line_no: u64, line: &str, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != expected {
        return Err(ReconcileError::format(
            line_no,
            format!("expected {} fields, found {}", expected, fields.len()),
        ));
    }
    Ok(fields)
}

fn parse_size(line_no: u64, field: &str) -> Result<u64> {
    let raw = field.trim().trim_matches('"');
    raw.parse::<u64>().map_err(|_| {
        ReconcileError::format(line_no, format!("invalid size field: {:?}", field))
    })
}

fn parse_folder_flag(line_no: u64, field: &str) -> Result<bool> {
    let raw = path::unquote(field.trim());
    if raw.eq_ignore_ascii_case("TRUE") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("FALSE") {
        Ok(false)
    } else {
        Err(ReconcileError::format(
            line_no,
            format!("invalid folder flag: {:?}", field),
        ))
    }
}

/// Parse a `YYYY/MM/DD` date and `HH:MM:SS` time
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let combined = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&combined, TIMESTAMP_FORMAT).ok()
}

/// Render a listing line (no line terminator)
pub fn format_listing_row(
    name: &str,
    full_path: &str,
    extension: &str,
    size: u64,
    is_folder: bool,
    date: &str,
    time: &str,
) -> String {
    format!(
        "\"{}\",\"{}\",\"{}\",{},{},{},{}",
        name,
        full_path,
        extension,
        size,
        if is_folder { "TRUE" } else { "FALSE" },
        date,
        time
    )
}

/// One row of a listing snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// File name, unquoted
    pub name: String,
    /// Full path field exactly as written (quotes included)
    pub raw_path: String,
    /// Full path, normalized
    pub path: String,
    /// Extension, unquoted
    pub extension: String,
    pub size: u64,
    pub is_folder: bool,
    /// `None` when the date or time column is unparsable
    pub modified_at: Option<NaiveDateTime>,
}

impl ListingRow {
    /// Parse a listing line
    pub fn parse(line_no: u64, line: &str) -> Result<Self> {
        let f = split_fields(line_no, line, LISTING_FIELDS)?;
        Ok(Self {
            name: path::unquote(f[0]).to_string(),
            raw_path: f[1].to_string(),
            path: path::normalize(f[1]),
            extension: path::unquote(f[2]).to_string(),
            size: parse_size(line_no, f[3])?,
            is_folder: parse_folder_flag(line_no, f[4])?,
            modified_at: parse_timestamp(f[5], f[6]),
        })
    }
}

/// One row of a cloud document-library export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudRow {
    pub name: String,
    /// Modification time, already shifted by [`CLOUD_TIME_OFFSET_HOURS`]
    pub modified_at: NaiveDateTime,
    pub size: u64,
    pub is_folder: bool,
    /// Parent folder path, quotes removed
    pub parent: String,
}

impl CloudRow {
    /// Parse a cloud export line (not the header)
    pub fn parse(line_no: u64, line: &str) -> Result<Self> {
        let f = split_fields(line_no, line, CLOUD_FIELDS)?;
        let stamp = f[1].replace('"', "");
        let modified_at = NaiveDateTime::parse_from_str(stamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| {
                ReconcileError::format(line_no, format!("invalid timestamp {:?}: {}", stamp, e))
            })?
            .checked_add_signed(TimeDelta::hours(CLOUD_TIME_OFFSET_HOURS))
            .ok_or_else(|| {
                ReconcileError::format(line_no, format!("timestamp out of range: {:?}", stamp))
            })?;

        let is_folder = f[4].replace('"', "").trim() == "Folder";
        // Folders are exported without a size
        let size = if is_folder && f[3].trim().trim_matches('"').is_empty() {
            0
        } else {
            parse_size(line_no, f[3])?
        };

        Ok(Self {
            name: f[0].replace('"', ""),
            modified_at,
            size,
            is_folder,
            parent: f[5].replace('"', ""),
        })
    }

    /// Absolute path: `prefix` + `parent/name`, with every `strip` occurrence removed
    pub fn full_path(&self, prefix: &str, strip: Option<&str>) -> String {
        let mut relative = format!("{}/{}", self.parent, self.name);
        if let Some(s) = strip.filter(|s| !s.is_empty()) {
            relative = relative.replace(s, "");
        }
        path::normalize(&format!("{}{}", prefix, relative))
    }
}

/// One row of the project (expected-file) list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    /// Project, category, subcategory and path segment, as written
    pub segments: [String; 4],
    pub size: u64,
}

impl ProjectRow {
    /// Parse a project line
    pub fn parse(line_no: u64, line: &str) -> Result<Self> {
        let f = split_fields(line_no, line, PROJECT_FIELDS)?;
        Ok(Self {
            segments: [
                f[0].to_string(),
                f[1].to_string(),
                f[2].to_string(),
                f[3].to_string(),
            ],
            size: parse_size(line_no, f[4])?,
        })
    }

    /// The raw path-segment column, used for ignore filtering
    pub fn path_segment(&self) -> &str {
        &self.segments[3]
    }

    /// Absolute path under `prefix` (a value from [`path::normalize_prefix`])
    pub fn full_path(&self, prefix: &str) -> String {
        format!("{}{}", prefix, path::normalize(&self.segments.join("/")))
    }
}
