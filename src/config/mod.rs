//! Configuration management.
//!
//! This module resolves where Listago keeps its files and derives the
//! runtime settings the storage layer needs from the preferences.
//!
//! # Locations
//!
//! - **Database**: `<data dir>/listago/main.db`
//! - **Cache**: `<cache dir>/listago`, with `export/` and `import/` below it
//! - **Documents**: where finished export archives are copied to
//! - **Preferences**: `<config dir>/listago/preferences.json`
//!
//! Each location can be overridden by an explicit path (CLI flag) or an
//! environment variable.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs, UserDirs};

use crate::error::{Error, Result};
use crate::prefs::{PrefKey, Preferences};
use crate::storage::CleanupPolicy;

/// Database file name inside the data directory.
pub const DB_FILE: &str = "main.db";

/// Preferences file name inside the config directory.
pub const PREFS_FILE: &str = "preferences.json";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("de", "listago", "listago")
}

/// Non-empty value of an environment variable.
fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `LISTAGO_DB` environment variable
/// 3. Platform data directory: `.../listago/main.db`
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined.
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path("LISTAGO_DB") {
        return Ok(path);
    }
    project_dirs()
        .map(|dirs| dirs.data_dir().join(DB_FILE))
        .ok_or_else(|| Error::Config("Could not determine a data directory".to_string()))
}

/// Resolve the cache directory used for export and import scratch space.
///
/// Priority: explicit path, `LISTAGO_CACHE`, platform cache directory.
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined.
pub fn resolve_cache_dir(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path("LISTAGO_CACHE") {
        return Ok(path);
    }
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| Error::Config("Could not determine a cache directory".to_string()))
}

/// Resolve the directory finished export archives are copied to.
///
/// Priority: explicit path, `LISTAGO_DOCUMENTS`, the user's documents
/// folder, the home directory.
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined.
pub fn resolve_documents_dir(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path("LISTAGO_DOCUMENTS") {
        return Ok(path);
    }
    UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
        .ok_or_else(|| Error::Config("Could not determine a documents directory".to_string()))
}

/// Resolve the preferences file.
///
/// Priority: explicit path, `LISTAGO_PREFS`, platform config directory.
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined.
pub fn resolve_prefs_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path("LISTAGO_PREFS") {
        return Ok(path);
    }
    project_dirs()
        .map(|dirs| dirs.config_dir().join(PREFS_FILE))
        .ok_or_else(|| Error::Config("Could not determine a config directory".to_string()))
}

/// How long, and how much, trash is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrashPolicy {
    /// Days trashed entries are kept. `None` keeps them until the count
    /// limit removes them.
    pub keep_days: Option<u64>,
    /// Most trashed lists kept (and most trashed items per list).
    pub max_count: Option<usize>,
}

impl TrashPolicy {
    /// Policy from the `TrashKeepinStock` preference and the repository's
    /// trash limit. Zero days means no age limit.
    #[must_use]
    pub fn from_prefs(prefs: &dyn Preferences, max_count: Option<usize>) -> Self {
        Self {
            keep_days: prefs.get_u64(PrefKey::TrashKeepinStock).filter(|d| *d > 0),
            max_count: max_count.filter(|m| *m > 0),
        }
    }

    #[must_use]
    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            older_than: self.keep_days.map(|d| d.saturating_mul(SECONDS_PER_DAY)),
            max_count: self.max_count,
        }
    }
}
