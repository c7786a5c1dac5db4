//! CSV persistence for normalized records.
//!
//! The snapshot file is rewritten on every cycle through a temporary file and a
//! rename, so a concurrent reader sees either the old or the new file. The
//! history file is only ever appended to.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::record::{CSV_HEADERS, NormalizedRecord};
use csv::WriterBuilder;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_rows<W: Write>(writer: W, header: bool, records: &[NormalizedRecord]) -> Result<()> {
    // Headers are written by hand so that an empty batch still gets one.
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    if header {
        writer.write_record(CSV_HEADERS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the snapshot file at `path` with `records`.
///
/// The header is always written, so an empty batch leaves a header-only file.
pub fn write_snapshot(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = temp_path(path);

    let file = File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    write_rows(&file, true, records)?;
    file.sync_all()?;

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into place at {}", path.display()))?;

    debug!(path = %path.display(), rows = records.len(), "Snapshot written");
    Ok(())
}

/// Appends `records` to the CSV file at `path`.
///
/// Creates the file with headers if it does not exist or is empty.
pub fn append_records(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    ensure_parent(path)?;

    let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    debug!(path = %path.display(), has_content, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    write_rows(file, !has_content, records)
}

/// Reads every record from a CSV file written by this module.
///
/// A missing file reads as no records.
pub fn read_records(path: &Path) -> Result<Vec<NormalizedRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: NormalizedRecord =
            result.with_context(|| format!("Malformed row in {}", path.display()))?;
        records.push(record);
    }

    Ok(records)
}
