//! File helpers for archive export and import.
//!
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - Filesystem-safe names for per-list files
//! - Zipping a directory tree and unpacking an archive
//! - Detecting whether a tree holds any usable JSON

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;

/// Maximum length of the name part of a per-list filename.
pub const MAX_NAME_LEN: usize = 20;

/// Write content to a file atomically.
///
/// Content goes to a sibling temp file first, is synced to disk, then
/// renamed over the target. If any step fails, the original file (if any)
/// remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)
}

/// Reduce a display name to something safe to use in a filename.
///
/// Keeps letters, digits, `-` and `_`; spaces and everything else become
/// `_`. The result is cut to [`MAX_NAME_LEN`] characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "list".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `{id}-{sanitized name}.json`
#[must_use]
pub fn entity_filename(id: i64, name: &str) -> String {
    format!("{id}-{}.json", sanitize_filename(name))
}

/// Path in `dir` for `basename.ext` that does not exist yet.
///
/// When the plain name is taken, a `_YYYY-MM-DD_HHMMSS` suffix from `now`
/// is appended, then a counter if that is taken too.
#[must_use]
pub fn unique_destination(dir: &Path, basename: &str, ext: &str, now: DateTime<Local>) -> PathBuf {
    let plain = dir.join(format!("{basename}.{ext}"));
    if !plain.exists() {
        return plain;
    }
    let stamp = now.format("%Y-%m-%d_%H%M%S");
    let stamped = dir.join(format!("{basename}_{stamp}.{ext}"));
    if !stamped.exists() {
        return stamped;
    }
    (2..)
        .map(|n| dir.join(format!("{basename}_{stamp}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(stamped)
}

/// Remove a directory tree; a missing directory is not an error.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Pack every file below `source` into a deflate zip at `destination`.
///
/// Entry names are relative to `source` and use `/` separators.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the archive written.
pub fn zip_dir(source: &Path, destination: &Path) -> Result<usize> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut files = Vec::new();
    collect_files(source, &mut files)?;
    files.sort();

    let mut zip = ZipWriter::new(File::create(destination)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for path in &files {
        let name = path
            .strip_prefix(source)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;
    Ok(files.len())
}

/// Unpack the zip archive at `archive` into `destination`.
///
/// Entries that would escape `destination` are rejected by the zip reader.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or extracted.
pub fn unzip(archive: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)?;
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    zip.extract(destination)?;
    Ok(())
}

/// Whether `dir` contains, at any depth, at least one non-empty `.json`
/// file.
#[must_use]
pub fn has_json_content(dir: &Path) -> bool {
    let mut files = Vec::new();
    if collect_files(dir, &mut files).is_err() {
        return false;
    }
    files.iter().any(|f| is_json_file(f) && fs::metadata(f).is_ok_and(|m| m.len() > 0))
}

/// `.json` files directly inside `dir`, sorted by name. A missing
/// directory yields nothing.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn json_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_json_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
