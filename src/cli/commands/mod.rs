//! Command implementations.

pub mod lists;
pub mod maintenance;
pub mod transfer;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::Cli;
use crate::config::{resolve_cache_dir, resolve_db_path, resolve_documents_dir, resolve_prefs_path};
use crate::error::Result;
use crate::prefs::JsonPreferences;
use crate::storage::{ConnectionGuard, DbTarget, ListsRepository, MigrationRegistry};

/// Locations resolved from the global flags.
#[derive(Debug, Clone)]
pub struct Paths {
    pub db: PathBuf,
    pub cache: PathBuf,
    pub documents: PathBuf,
    pub prefs: PathBuf,
}

impl Paths {
    /// # Errors
    ///
    /// Returns an error if a default location cannot be determined.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Ok(Self {
            db: resolve_db_path(cli.db.as_deref())?,
            cache: resolve_cache_dir(cli.cache_dir.as_deref())?,
            documents: resolve_documents_dir(cli.documents_dir.as_deref())?,
            prefs: resolve_prefs_path(cli.prefs.as_deref())?,
        })
    }

    /// Open the database (creating and migrating it as needed).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn repository(&self) -> Result<ListsRepository> {
        let guard = ConnectionGuard::new(
            DbTarget::File(self.db.clone()),
            MigrationRegistry::with_builtin(),
        );
        let repo = ListsRepository::new(Arc::new(guard));
        repo.initialize().await?;
        Ok(repo)
    }

    /// # Errors
    ///
    /// Returns an error if the preferences file cannot be read.
    pub fn preferences(&self) -> Result<JsonPreferences> {
        JsonPreferences::open(&self.prefs)
    }
}

/// Print a JSON value on stdout.
pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
