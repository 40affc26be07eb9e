//! Row identifiers.
//!
//! An entity that has never been written has no engine-assigned id yet. It
//! carries a unique negative placeholder instead, so that items created in
//! the same save can still be told apart and remapped once the insert
//! returns their real id.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_VIRTUAL: AtomicI64 = AtomicI64::new(-1);

/// Identifier of a list or listitem row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowId {
    /// Placeholder for an entity not yet stored. Always negative.
    Virtual(i64),
    /// Id assigned by the store engine. Always positive.
    Persisted(i64),
}

impl RowId {
    /// Allocate a fresh, process-unique virtual id.
    #[must_use]
    pub fn new_virtual() -> Self {
        Self::Virtual(NEXT_VIRTUAL.fetch_sub(1, Ordering::Relaxed))
    }

    /// Wrap an id read from (or returned by) the store.
    #[must_use]
    pub const fn persisted(id: i64) -> Self {
        Self::Persisted(id)
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }

    /// The stored id, if the entity has one.
    #[must_use]
    pub const fn as_persisted(&self) -> Option<i64> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Virtual(_) => None,
        }
    }

    /// Raw numeric value, negative for virtual ids.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        match self {
            Self::Virtual(id) | Self::Persisted(id) => *id,
        }
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new_virtual()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Virtual(id) => write!(f, "virtual:{id}"),
            Self::Persisted(id) => write!(f, "{id}"),
        }
    }
}
