//! Versioned schema upgrades embedded at compile time.
//!
//! Migrations are sourced from `/migrations/` at the crate root and
//! embedded into the binary using `include_str!`. A [`MigrationRegistry`]
//! is handed to the connection guard before the first open; the guard
//! applies every pending migration while opening.

use std::borrow::Cow;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::schema::ensure_migrations_table;

/// A single migration with version number and SQL content.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: Cow<'static, str>,
}

impl Migration {
    #[must_use]
    pub const fn embedded(version: u32, name: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            name,
            sql: Cow::Borrowed(sql),
        }
    }
}

/// Builtin migrations, in order.
///
/// Names match the SQL filenames (without .sql extension).
const BUILTIN: &[(u32, &str, &str)] = &[
    (
        1,
        "001_create_lists",
        include_str!("../../migrations/001_create_lists.sql"),
    ),
    (
        2,
        "002_listitems_indexes",
        include_str!("../../migrations/002_listitems_indexes.sql"),
    ),
];

/// Ordered set of upgrade statements. Versions only ever increase.
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the migrations shipped with the crate.
    #[must_use]
    pub fn with_builtin() -> Self {
        Self {
            migrations: BUILTIN
                .iter()
                .map(|(version, name, sql)| Migration::embedded(*version, name, sql))
                .collect(),
        }
    }

    /// Append a migration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the version is not greater than the last
    /// registered one.
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        if let Some(last) = self.migrations.last() {
            if migration.version <= last.version {
                return Err(Error::InvalidArgument(format!(
                    "Migration {} ({}) must have a version greater than {}",
                    migration.version, migration.name, last.version
                )));
            }
        }
        self.migrations.push(migration);
        Ok(())
    }

    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Highest version this registry knows about.
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Apply every migration newer than the database's current version.
    ///
    /// Each migration runs in its own transaction together with its
    /// `schema_migrations` record, so a failed migration leaves no trace and
    /// is retried on the next open. Safe to call on every open.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub fn apply(&self, conn: &mut Connection) -> Result<u32> {
        ensure_migrations_table(conn)?;
        let current = current_version(conn)?;
        let mut applied = 0;

        for migration in self.migrations.iter().filter(|m| m.version > current) {
            info!(version = migration.version, name = migration.name, "Applying migration");

            let tx = conn.transaction()?;
            tx.execute_batch(&migration.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.name,
                    chrono::Utc::now().timestamp_millis()
                ],
            )?;
            tx.commit()?;
            applied += 1;
        }

        if applied == 0 {
            debug!(version = current, "Schema up to date");
        }
        Ok(applied)
    }
}

/// Highest applied migration version, `0` on a fresh database.
///
/// # Errors
///
/// Returns an error if the bookkeeping table cannot be read.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Applied migrations as `(version, name, applied_at)`, oldest first.
///
/// # Errors
///
/// Returns an error if the bookkeeping table cannot be read.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<(u32, String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT version, name, applied_at FROM schema_migrations ORDER BY version")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_builtin_migrations_compile() {
        let registry = MigrationRegistry::with_builtin();
        assert_eq!(registry.migrations().len(), 2);
        assert_eq!(registry.latest_version(), 2);
    }

    #[test]
    fn test_apply_fresh_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        let applied = MigrationRegistry::with_builtin().apply(&mut conn).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(current_version(&conn).unwrap(), 2);

        // tables exist
        conn.prepare("SELECT `id`, `order`, `reset_weekday` FROM `lists`").unwrap();
        conn.prepare("SELECT `locked`, `legacy_uuid` FROM `listitems`").unwrap();

        // device bookkeeping belongs to the watch integration, not the store
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(tables, ["listitems", "lists", "schema_migrations"]);
    }

    #[test]
    fn test_apply_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        let registry = MigrationRegistry::with_builtin();
        registry.apply(&mut conn).unwrap();
        assert_eq!(registry.apply(&mut conn).unwrap(), 0);
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn test_register_rejects_non_increasing() {
        let mut registry = MigrationRegistry::with_builtin();
        let err = registry
            .register(Migration::embedded(2, "dup", "SELECT 1;"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        registry
            .register(Migration::embedded(3, "003_extra", "ALTER TABLE `lists` ADD COLUMN `color` TEXT;"))
            .unwrap();
        assert_eq!(registry.latest_version(), 3);
    }

    #[test]
    fn test_later_migration_applies_on_existing_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationRegistry::with_builtin().apply(&mut conn).unwrap();

        let mut registry = MigrationRegistry::with_builtin();
        registry
            .register(Migration::embedded(3, "003_extra", "ALTER TABLE `lists` ADD COLUMN `color` TEXT;"))
            .unwrap();
        assert_eq!(registry.apply(&mut conn).unwrap(), 1);

        let applied = applied_migrations(&conn).unwrap();
        assert_eq!(applied.last().unwrap().1, "003_extra");
    }

    #[test]
    fn test_failed_migration_is_not_recorded() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut registry = MigrationRegistry::with_builtin();
        registry
            .register(Migration::embedded(3, "003_broken", "ALTER TABLE `nope` ADD COLUMN `x` TEXT;"))
            .unwrap();
        assert!(registry.apply(&mut conn).is_err());
        assert_eq!(current_version(&conn).unwrap(), 2);
    }
}
