//! SQLite storage layer for Listago.
//!
//! This module provides the persistence layer using SQLite with:
//! - One connection, serialized behind an async mutex
//! - Versioned migrations applied on open
//! - Transaction discipline for multi-statement writes
//! - Soft-delete (trash) semantics for lists and items
//!
//! # Submodules
//!
//! - [`connection`] - Connection guard (query / execute / transaction)
//! - [`migrations`] - Migration registry
//! - [`schema`] - Pragmas and migration bookkeeping
//! - [`lists`] - Lists and listitems repository

pub mod connection;
pub mod lists;
pub mod migrations;
pub mod schema;

pub use connection::{Changes, ConnectionGuard, DbTarget};
pub use lists::{
    CleanupPolicy, CleanupStats, DatabaseStats, DeletedCounts, ItemScope, ItemsOrder,
    LegacyMatch, ListsOrder, ListsQuery, ListsRepository, OrderDirection, PartitionCounts,
    TrashFilter,
};
pub use migrations::{Migration, MigrationRegistry};
