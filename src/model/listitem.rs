//! Listitem entity.

use rusqlite::Row;
use rusqlite::types::Value;

use crate::model::{RowId, now_millis};

/// A single entry of a [`List`](crate::model::List).
///
/// Items are stored in their own table and point back to their list through
/// `list_id`. Setters update `modified` and mark the item dirty; the
/// repository clears the flag after a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct Listitem {
    pub(crate) id: RowId,
    pub(crate) list_id: Option<i64>,
    pub(crate) item: String,
    pub(crate) note: Option<String>,
    pub(crate) order: i64,
    pub(crate) hidden: bool,
    pub(crate) locked: bool,
    pub(crate) created: i64,
    pub(crate) modified: i64,
    pub(crate) deleted: Option<i64>,
    pub(crate) legacy_uuid: Option<String>,
    pub(crate) dirty: bool,
}

impl Listitem {
    /// Create a new, not yet stored item.
    #[must_use]
    pub fn new(item: impl Into<String>, order: i64) -> Self {
        let now = now_millis();
        Self {
            id: RowId::new_virtual(),
            list_id: None,
            item: item.into(),
            note: None,
            order,
            hidden: false,
            locked: false,
            created: now,
            modified: now,
            deleted: None,
            legacy_uuid: None,
            dirty: true,
        }
    }

    /// Build an item from a `listitems` row.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or has the wrong type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: RowId::persisted(row.get("id")?),
            list_id: row.get("list_id")?,
            item: row.get("item")?,
            note: row.get("note")?,
            order: row.get::<_, Option<i64>>("order")?.unwrap_or(0),
            hidden: row.get::<_, Option<bool>>("hidden")?.unwrap_or(false),
            locked: row.get::<_, Option<bool>>("locked")?.unwrap_or(false),
            created: row.get("created")?,
            modified: row.get("modified")?,
            deleted: row.get("deleted")?,
            legacy_uuid: row.get("legacy_uuid")?,
            dirty: false,
        })
    }

    /// Column/value pairs for INSERT and UPDATE statements, without `id`.
    #[must_use]
    pub fn backend_columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("list_id", self.list_id.into()),
            ("item", self.item.clone().into()),
            ("note", self.note.clone().into()),
            ("order", self.order.into()),
            ("hidden", self.hidden.into()),
            ("locked", self.locked.into()),
            ("created", self.created.into()),
            ("modified", self.modified.into()),
            ("deleted", self.deleted.into()),
            ("legacy_uuid", self.legacy_uuid.clone().into()),
        ]
    }

    #[must_use]
    pub fn id(&self) -> RowId {
        self.id
    }

    #[must_use]
    pub fn list_id(&self) -> Option<i64> {
        self.list_id
    }

    #[must_use]
    pub fn item(&self) -> &str {
        &self.item
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
    }

    #[must_use]
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub fn locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn created(&self) -> i64 {
        self.created
    }

    #[must_use]
    pub fn modified(&self) -> i64 {
        self.modified
    }

    #[must_use]
    pub fn deleted(&self) -> Option<i64> {
        self.deleted
    }

    #[must_use]
    pub fn legacy_uuid(&self) -> Option<&str> {
        self.legacy_uuid.as_deref()
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.id.is_virtual()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_trashed(&self) -> bool {
        self.deleted.is_some()
    }

    pub fn set_item(&mut self, item: impl Into<String>) {
        let item = item.into();
        if item != self.item {
            self.item = item;
            self.touch();
        }
    }

    pub fn set_note(&mut self, note: Option<String>) {
        let note = note.filter(|n| !n.is_empty());
        if note != self.note {
            self.note = note;
            self.touch();
        }
    }

    pub fn set_order(&mut self, order: i64) {
        if order != self.order {
            self.order = order;
            self.touch();
        }
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden != self.hidden {
            self.hidden = hidden;
            self.touch();
        }
    }

    pub fn set_locked(&mut self, locked: bool) {
        if locked != self.locked {
            self.locked = locked;
            self.touch();
        }
    }

    /// Mark as clean after a successful write.
    pub fn clean(&mut self) {
        self.dirty = false;
    }

    fn touch(&mut self) {
        self.modified = now_millis();
        self.dirty = true;
    }

    /// Short description for log lines.
    #[must_use]
    pub fn to_log(&self) -> String {
        let text: String = self.item.chars().take(20).collect();
        format!("'{text}' (id:{})", self.id)
    }
}
