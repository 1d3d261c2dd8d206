//! Upload-command generation from a reconciliation output file
//!
//! Each `<label>,<path>` line becomes one PnP PowerShell `Add-PnPFile`
//! invocation that re-uploads the file into the matching library folder.

use log::info;
use std::io::{BufWriter, Read, Write};

use crate::error::{ReconcileError, Result};
use crate::listing::numbered_lines;
use crate::models::{LineCounts, MismatchReason};

/// Document library every command targets
pub const LIBRARY_FOLDER: &str = "Shared%20Documents";

/// Folder rewriting applied to each path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Leading folder removed from the target folder
    pub trim: Option<String>,
    /// Folder prepended to the target folder
    pub upload_path: Option<String>,
}

impl RecoveryOptions {
    pub fn new(trim: Option<String>, upload_path: Option<String>) -> Self {
        Self {
            trim: trim.filter(|t| !t.is_empty()).map(leading_slash),
            upload_path: upload_path.filter(|p| !p.is_empty()).map(leading_slash),
        }
    }
}

fn leading_slash(folder: String) -> String {
    if folder.starts_with('/') {
        folder
    } else {
        format!("/{}", folder)
    }
}

/// Build the upload command for one output line
pub fn recovery_command(line_no: u64, line: &str, options: &RecoveryOptions) -> Result<String> {
    let (label, file_path) = line.split_once(',').ok_or_else(|| {
        ReconcileError::format(line_no, format!("expected <label>,<path>: {:?}", line))
    })?;
    if MismatchReason::from_label(label).is_none() {
        return Err(ReconcileError::format(
            line_no,
            format!("unknown mismatch label: {:?}", label),
        ));
    }

    let (first, last) = match (file_path.find('/'), file_path.rfind('/')) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(ReconcileError::format(
                line_no,
                format!("path has no folder: {:?}", file_path),
            ))
        }
    };

    let mut folder = &file_path[first..last];
    if let Some(trim) = &options.trim {
        folder = folder.strip_prefix(trim.as_str()).unwrap_or(folder);
    }
    let folder = match &options.upload_path {
        Some(upload) => format!("{}{}", upload, folder),
        None => folder.to_string(),
    };

    Ok(format!(
        "Add-PnPFile -Path \"{}\" -Folder \"{}{}\"",
        escape_powershell(file_path),
        LIBRARY_FOLDER,
        escape_powershell(&folder)
    ))
}

/// Escape `$` so PowerShell does not expand it inside double quotes
fn escape_powershell(s: &str) -> String {
    s.replace('$', "`$")
}

/// Convert every line of `input` into an upload command on `output`
pub fn write_recovery_commands<R: Read, W: Write>(
    input: R,
    output: W,
    options: &RecoveryOptions,
) -> Result<LineCounts> {
    let mut out = BufWriter::new(output);
    let mut counts = LineCounts::default();

    for line in numbered_lines(input)? {
        let (line_no, text) = line?;
        counts.read += 1;
        if text.trim().is_empty() {
            continue;
        }
        writeln!(out, "{}", recovery_command(line_no, &text, options)?)?;
        counts.written += 1;
    }

    out.flush()?;
    info!(
        "Recovery commands written: read={}, written={}",
        counts.read, counts.written
    );
    Ok(counts)
}
