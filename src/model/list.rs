//! List entity with reset schedule and sync-device metadata.

use rusqlite::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Listitem, RowId, now_millis};

/// How often a list with an active reset schedule is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetInterval {
    Daily,
    Weekly,
    Monthly,
}

impl ResetInterval {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ResetInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(format!("Unknown reset interval: {s}")),
        }
    }
}

/// Automatic reset schedule of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReset {
    pub active: bool,
    pub interval: ResetInterval,
    pub hour: u32,
    pub minute: u32,
    /// Day of month, used by monthly resets.
    pub day: u32,
    /// Day of week, used by weekly resets.
    pub weekday: u32,
}

/// A watch (or other device) the list is kept in sync with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDevice {
    pub id: i64,
    pub name: String,
}

/// A shopping or task list.
///
/// Active lists have `deleted == None`; trashed lists carry the deletion
/// timestamp. `items` holds the active items when the list was fully
/// loaded; a peeked list only carries `item_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub(crate) id: RowId,
    pub(crate) name: String,
    pub(crate) order: i64,
    pub(crate) created: i64,
    pub(crate) modified: i64,
    pub(crate) deleted: Option<i64>,
    pub(crate) reset: Option<ListReset>,
    pub(crate) sync_devices: Vec<SyncDevice>,
    pub(crate) legacy_uuid: Option<String>,
    pub(crate) items: Vec<Listitem>,
    pub(crate) item_count: Option<usize>,
    pub(crate) dirty: bool,
}

impl List {
    /// Create a new, not yet stored list.
    #[must_use]
    pub fn new(name: impl Into<String>, order: i64) -> Self {
        let now = now_millis();
        Self {
            id: RowId::new_virtual(),
            name: name.into(),
            order,
            created: now,
            modified: now,
            deleted: None,
            reset: None,
            sync_devices: Vec::new(),
            legacy_uuid: None,
            items: Vec::new(),
            item_count: None,
            dirty: true,
        }
    }

    /// Build a list from a `lists` row. Items are attached separately.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or has the wrong type.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: i64 = row.get("id")?;
        let reset = match row.get::<_, Option<bool>>("reset")? {
            Some(active) => {
                let interval: Option<String> = row.get("reset_interval")?;
                interval.and_then(|i| i.parse().ok()).map(|interval| ListReset {
                    active,
                    interval,
                    hour: row.get::<_, Option<u32>>("reset_hour").ok().flatten().unwrap_or(0),
                    minute: row.get::<_, Option<u32>>("reset_minute").ok().flatten().unwrap_or(0),
                    day: row.get::<_, Option<u32>>("reset_day").ok().flatten().unwrap_or(1),
                    weekday: row.get::<_, Option<u32>>("reset_weekday").ok().flatten().unwrap_or(1),
                })
            }
            None => None,
        };
        let sync_devices = match row.get::<_, Option<String>>("sync_devices")? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(list_id = id, error = %e, "Ignoring malformed sync_devices column");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Ok(Self {
            id: RowId::persisted(id),
            name: row.get("name")?,
            order: row.get::<_, Option<i64>>("order")?.unwrap_or(0),
            created: row.get("created")?,
            modified: row.get("modified")?,
            deleted: row.get("deleted")?,
            reset,
            sync_devices,
            legacy_uuid: row.get("legacy_uuid")?,
            items: Vec::new(),
            item_count: None,
            dirty: false,
        })
    }

    /// Column/value pairs for INSERT and UPDATE statements, without `id`.
    #[must_use]
    pub fn backend_columns(&self) -> Vec<(&'static str, Value)> {
        let sync_devices = if self.sync_devices.is_empty() {
            Value::Null
        } else {
            serde_json::to_string(&self.sync_devices).map_or(Value::Null, Value::from)
        };
        let reset = self.reset.as_ref();
        vec![
            ("name", self.name.clone().into()),
            ("order", self.order.into()),
            ("created", self.created.into()),
            ("modified", self.modified.into()),
            ("deleted", self.deleted.into()),
            ("sync_devices", sync_devices),
            ("reset", reset.map(|r| r.active).into()),
            ("reset_interval", reset.map(|r| r.interval.as_str().to_string()).into()),
            ("reset_hour", reset.map(|r| i64::from(r.hour)).into()),
            ("reset_minute", reset.map(|r| i64::from(r.minute)).into()),
            ("reset_day", reset.map(|r| i64::from(r.day)).into()),
            ("reset_weekday", reset.map(|r| i64::from(r.weekday)).into()),
            ("legacy_uuid", self.legacy_uuid.clone().into()),
        ]
    }

    #[must_use]
    pub fn id(&self) -> RowId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
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
    pub fn reset(&self) -> Option<&ListReset> {
        self.reset.as_ref()
    }

    #[must_use]
    pub fn sync_devices(&self) -> &[SyncDevice] {
        &self.sync_devices
    }

    #[must_use]
    pub fn legacy_uuid(&self) -> Option<&str> {
        self.legacy_uuid.as_deref()
    }

    #[must_use]
    pub fn items(&self) -> &[Listitem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Listitem] {
        &mut self.items
    }

    /// Number of active items: the loaded items, or the peeked count.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count.unwrap_or(self.items.len())
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.id.is_virtual()
    }

    /// Whether the list row or any of its items has unsaved changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.items.iter().any(|i| i.is_dirty() || i.is_virtual())
    }

    #[must_use]
    pub fn is_trashed(&self) -> bool {
        self.deleted.is_some()
    }

    /// True when items were not loaded, only counted.
    #[must_use]
    pub fn is_peek(&self) -> bool {
        self.item_count.is_some()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.name {
            self.name = name;
            self.touch();
        }
    }

    pub fn set_order(&mut self, order: i64) {
        if order != self.order {
            self.order = order;
            self.touch();
        }
    }

    pub fn set_reset(&mut self, reset: Option<ListReset>) {
        if reset != self.reset {
            self.reset = reset;
            self.touch();
        }
    }

    pub fn set_sync_devices(&mut self, devices: Vec<SyncDevice>) {
        if devices != self.sync_devices {
            self.sync_devices = devices;
            self.touch();
        }
    }

    /// Append an item at the end of the list.
    pub fn add_item(&mut self, mut item: Listitem) {
        if let Some(id) = self.id.as_persisted() {
            item.list_id = Some(id);
        }
        self.items.push(item);
        self.touch();
    }

    /// Remove an item from the in-memory list, returning it.
    pub fn remove_item(&mut self, id: RowId) -> Option<Listitem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        self.touch();
        Some(self.items.remove(pos))
    }

    /// Next free order value among the loaded items.
    #[must_use]
    pub fn next_item_order(&self) -> i64 {
        self.items.iter().map(Listitem::order).max().map_or(0, |o| o + 1)
    }

    /// Mark the list and all items clean after a successful write.
    pub fn clean(&mut self) {
        self.dirty = false;
        for item in &mut self.items {
            item.clean();
        }
    }

    fn touch(&mut self) {
        self.modified = now_millis();
        self.dirty = true;
    }

    /// Short description for log lines.
    #[must_use]
    pub fn to_log(&self) -> String {
        let name: String = self.name.chars().take(20).collect();
        format!("'{name}' (id:{})", self.id)
    }
}
