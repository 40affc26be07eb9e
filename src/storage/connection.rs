//! Serialized access to the single store connection.
//!
//! [`ConnectionGuard`] owns the one `rusqlite::Connection` of the process
//! and is shared (behind an `Arc`) by everything that touches the store.
//! Every operation first takes the guard's async mutex, so at most one
//! logical operation runs against the connection at a time and callers are
//! admitted in FIFO order. The lock is released when the operation returns,
//! whether it succeeded or not.
//!
//! The connection is opened lazily. If it was never opened, or was dropped
//! after a connection-level failure, the next operation tries to reopen it
//! exactly once before failing with [`Error::NotConnected`].
//!
//! SQLite calls block. On a multi-thread runtime they run inside
//! [`tokio::task::block_in_place`], so a long cleanup pass does not stall
//! the other tasks of that worker. A current-thread runtime has no other
//! worker to hand them to and runs the calls inline.

use std::fmt;
use std::path::PathBuf;

use rusqlite::types::Value;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, params_from_iter};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::storage::migrations::MigrationRegistry;
use crate::storage::schema::apply_pragmas;

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(PathBuf),
    /// Private in-memory database. Its content is lost when the
    /// connection is dropped.
    Memory,
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => write!(f, ":memory:"),
        }
    }
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Changes {
    /// Rows affected by the statement.
    pub changes: usize,
    /// Rowid of the most recent successful INSERT on the connection.
    pub last_insert_id: i64,
}

/// Mutex-guarded owner of the store connection.
pub struct ConnectionGuard {
    target: DbTarget,
    registry: MigrationRegistry,
    conn: Mutex<Option<Connection>>,
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("target", &self.target)
            .field("migrations", &self.registry.latest_version())
            .finish_non_exhaustive()
    }
}

impl ConnectionGuard {
    /// Create a guard. Nothing is opened until the first operation (or
    /// [`open`](Self::open)); all migrations must be registered by then.
    #[must_use]
    pub fn new(target: DbTarget, registry: MigrationRegistry) -> Self {
        Self {
            target,
            registry,
            conn: Mutex::new(None),
        }
    }

    /// Guard over a fresh in-memory database with the builtin migrations.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(DbTarget::Memory, MigrationRegistry::with_builtin())
    }

    #[must_use]
    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    /// Open the connection and apply pending migrations.
    ///
    /// Returns immediately if the connection is already open.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if the database cannot be opened.
    pub async fn open(&self) -> Result<()> {
        self.acquire().await.map(|_| ())
    }

    /// Whether a connection is currently held.
    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Drop the connection. The next operation reopens it.
    pub async fn close(&self) {
        if self.conn.lock().await.take().is_some() {
            debug!(target_db = %self.target, "Closed database connection");
        }
    }

    /// Run a read statement and map every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unavailable or the statement
    /// fails.
    pub async fn query<T, F>(&self, sql: &str, params: Vec<Value>, mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.run("query", sql, |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| map(row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Run a read statement expected to return a single integer, such as a
    /// `COUNT(*)` or `MAX(...)`. `NULL` maps to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unavailable or the statement
    /// fails.
    pub async fn query_scalar(&self, sql: &str, params: Vec<Value>) -> Result<Option<i64>> {
        let rows = self
            .query(sql, params, |row| row.get::<_, Option<i64>>(0))
            .await?;
        Ok(rows.into_iter().next().flatten())
    }

    /// Run a single write statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unavailable or the statement
    /// fails.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<Changes> {
        self.run("execute", sql, |conn| {
            let changes = conn.execute(sql, params_from_iter(params))?;
            Ok(Changes {
                changes,
                last_insert_id: conn.last_insert_rowid(),
            })
        })
        .await
    }

    /// Run `f` inside one transaction.
    ///
    /// The callback receives the transaction handle and must issue all of
    /// its statements through it; calling back into the guard from inside
    /// the callback would wait on the lock it already holds. The
    /// transaction commits when `f` returns `Ok`. If `f` fails or the
    /// commit fails, it is rolled back explicitly and the error returned.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or an error if the connection is
    /// unavailable or begin/commit fails.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run("transaction", "BEGIN IMMEDIATE", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match f(&tx) {
                Ok(value) => {
                    if let Err(e) = tx.commit() {
                        rollback_if_open(conn);
                        return Err(e.into());
                    }
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rb) = tx.rollback() {
                        warn!(error = %rb, "Rollback failed");
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    /// Run several read statements against the connection under one lock.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or an error if the connection is
    /// unavailable.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.run("with_connection", "", |conn| f(conn)).await
    }

    /// Size of the database file in bytes; `0` for an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be inspected.
    pub async fn database_size(&self) -> Result<u64> {
        match &self.target {
            DbTarget::Memory => Ok(0),
            DbTarget::File(path) => {
                // Hold the gate so the size is not taken in the middle of a write.
                let _lock = self.conn.lock().await;
                let meta = std::fs::metadata(path).inspect_err(|e| {
                    error!(path = %path.display(), error = %e, "Could not get database size");
                })?;
                Ok(meta.len())
            }
        }
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            match self.connect() {
                Ok(conn) => *guard = Some(conn),
                Err(e) => {
                    error!(target_db = %self.target, error = %e, "Could not open database");
                    return Err(Error::NotConnected {
                        path: self.target.to_string(),
                    });
                }
            }
        }
        Ok(guard)
    }

    fn connect(&self) -> Result<Connection> {
        let mut conn = match &self.target {
            DbTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
            DbTarget::Memory => Connection::open_in_memory()?,
        };
        apply_pragmas(&conn, self.target == DbTarget::Memory)?;
        let applied = self.registry.apply(&mut conn)?;
        info!(target_db = %self.target, migrations = applied, "Opened database");
        Ok(conn)
    }

    /// Take the gate, (re)open if needed, run `f`, and log failures once.
    async fn run<T, F>(&self, op: &'static str, sql: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.acquire().await?;
        let Some(conn) = guard.as_mut() else {
            return Err(Error::NotConnected {
                path: self.target.to_string(),
            });
        };

        let result = run_blocking(|| f(conn));
        if let Err(e) = &result {
            error!(op, sql, error = %e, "Database operation failed");
            if e.is_connection_lost() {
                warn!(target_db = %self.target, "Dropping broken connection, will reopen on next use");
                *guard = None;
            }
        }
        result
    }
}

/// Run blocking work without parking the other tasks of this worker.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

fn rollback_if_open(conn: &Connection) {
    if !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Rollback after failed commit failed");
        }
    }
}
