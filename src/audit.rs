//! Append-only verdict audit trail.
//!
//! One CSV file, one row per dispatched verdict, header written exactly once.
//! Rows are never updated or deleted; the file is the local source of truth
//! even when every remote collaborator is down.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::VerdictRecord;

pub const AUDIT_HEADER: &str = "Timestamp,Result,Snapshot";

/// Timestamp format used in audit rows.
pub const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Durable append-only audit log.
///
/// Each append is a single flushed write; a row is never split across writes.
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Open (creating parent directories and the file as needed). Writes the
    /// header when the file is new or empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("creating audit log directory {}", parent.display())
                })?;
            }
        }
        let needs_header = match fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        if needs_header {
            file.write_all(format!("{}\n", AUDIT_HEADER).as_bytes())
                .context("writing audit log header")?;
            file.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append exactly one row for `record`.
    pub fn append(&mut self, record: &VerdictRecord) -> Result<()> {
        let snapshot = record
            .evidence_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let row = format!(
            "{},{},{}\n",
            record.at.format(AUDIT_TIME_FORMAT),
            csv_field(record.verdict.label()),
            csv_field(&snapshot),
        );
        // One write syscall per row, flushed before returning.
        self.file
            .write_all(row.as_bytes())
            .with_context(|| format!("appending to audit log {}", self.path.display()))?;
        self.file.flush()?;
        log::info!(
            "audit: {} {}",
            record.verdict,
            record
                .evidence_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(())
    }
}

/// Quote a field when it contains the separator, a quote, or a line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
