//! Data models for Listago.
//!
//! This module contains the in-memory entities backed by the store:
//! - [`List`] with its reset schedule and sync devices
//! - [`Listitem`]
//! - [`RowId`], the virtual/persisted identifier split

pub mod id;
pub mod list;
pub mod listitem;

pub use id::RowId;
pub use list::{List, ListReset, ResetInterval, SyncDevice};
pub use listitem::Listitem;

/// Current wall-clock time in Unix milliseconds.
///
/// All `created`/`modified`/`deleted` columns use this unit.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
