//! Archive model types.
//!
//! These are the JSON shapes of the per-entity files inside an export
//! archive. Field names follow the archive format (`updated`, `syncDevices`,
//! `uuid`), not the store columns.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{List, ListReset, Listitem, ResetInterval, SyncDevice};

/// Model revision written by this version.
pub const CURRENT_REVISION: u32 = 1;

/// Relative directory of active lists inside an archive.
pub const LISTS_DIR: &str = "lists/lists";
/// Relative directory of trashed lists inside an archive.
pub const TRASH_DIR: &str = "lists/trash";
/// Relative directory of trashed item groups inside an archive.
pub const TRASH_ITEMS_DIR: &str = "lists/trash/items";
/// Settings dump inside an archive.
pub const SETTINGS_FILE: &str = "settings.json";

/// Content classes an archive can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    Lists,
    Trash,
    Settings,
}

impl ContentClass {
    pub const ALL: [Self; 3] = [Self::Lists, Self::Trash, Self::Settings];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Trash => "trash",
            Self::Settings => "settings",
        }
    }

    /// Path of this class relative to the archive root.
    #[must_use]
    pub fn relative_path(&self) -> &'static Path {
        Path::new(match self {
            Self::Lists => LISTS_DIR,
            Self::Trash => TRASH_DIR,
            Self::Settings => SETTINGS_FILE,
        })
    }
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy correlation id. Older archives used numbers, newer ones strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyUuid {
    Text(String),
    Number(i64),
}

impl LegacyUuid {
    /// Value as stored in the `legacy_uuid` column.
    #[must_use]
    pub fn to_key(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Reset schedule as written to archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetModel {
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<ResetInterval>,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default = "one")]
    pub day: u32,
    #[serde(default = "one")]
    pub weekday: u32,
}

const fn one() -> u32 {
    1
}

impl From<&ListReset> for ResetModel {
    fn from(r: &ListReset) -> Self {
        Self {
            active: r.active,
            interval: Some(r.interval),
            hour: r.hour,
            minute: r.minute,
            day: r.day,
            weekday: r.weekday,
        }
    }
}

impl ResetModel {
    /// A schedule without interval carries no information.
    #[must_use]
    pub fn to_reset(&self) -> Option<ListReset> {
        self.interval.map(|interval| ListReset {
            active: self.active,
            interval,
            hour: self.hour,
            minute: self.minute,
            day: self.day,
            weekday: self.weekday,
        })
    }
}

/// Revision 1 list file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<LegacyUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub updated: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetModel>,
    /// Flag of the oldest format; superseded by `syncDevices`.
    #[serde(default, skip_serializing)]
    pub sync: Option<bool>,
    #[serde(
        default,
        rename = "syncDevices",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_devices: Option<Vec<SyncDevice>>,
    /// Item models, kept raw so every item is dispatched on its own `rev`.
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Value>,
}

impl ListModel {
    /// Current-revision model of a list and its loaded items.
    ///
    /// # Errors
    ///
    /// Returns an error if an item model cannot be converted to JSON.
    pub fn from_list(list: &List) -> serde_json::Result<Self> {
        let items = list
            .items()
            .iter()
            .map(|item| serde_json::to_value(ListitemModel::from_item(item)))
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Self {
            uuid: list.legacy_uuid().map(|u| LegacyUuid::Text(u.to_string())),
            id: list.id().as_persisted(),
            name: Some(list.name().to_string()),
            order: Some(list.order()),
            created: Some(list.created()),
            updated: Some(list.modified()),
            deleted: list.deleted(),
            reset: list.reset().map(ResetModel::from),
            sync: None,
            sync_devices: (!list.sync_devices().is_empty()).then(|| list.sync_devices().to_vec()),
            items,
            rev: Some(Value::from(CURRENT_REVISION)),
        })
    }
}

/// Revision 1 listitem model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListitemModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<LegacyUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub updated: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<i64>,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Value>,
}

impl ListitemModel {
    #[must_use]
    pub fn from_item(item: &Listitem) -> Self {
        Self {
            uuid: item.legacy_uuid().map(|u| LegacyUuid::Text(u.to_string())),
            id: item.id().as_persisted(),
            item: Some(item.item().to_string()),
            note: item.note().map(str::to_string),
            order: Some(item.order()),
            created: Some(item.created()),
            updated: Some(item.modified()),
            deleted: item.deleted(),
            hidden: Some(item.hidden()),
            locked: Some(item.locked()),
            rev: Some(Value::from(CURRENT_REVISION)),
        }
    }
}

/// Trashed items of one list, stored as `lists/trash/items/<list id>.json`.
///
/// The owner is identified by its id and, so it can be found again in
/// another store, its legacy uuid and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashGroupModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<LegacyUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default)]
    pub items: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_model_field_names() {
        let mut list = List::new("Groceries", 0);
        list.add_item(Listitem::new("Bread", 0));
        let model = ListModel::from_list(&list).unwrap();
        let json = serde_json::to_value(&model).unwrap();

        assert_eq!(json["name"], "Groceries");
        assert_eq!(json["rev"], 1);
        assert!(json.get("updated").is_some());
        assert!(json.get("id").is_none(), "virtual ids are not exported");
        assert!(json.get("syncDevices").is_none());
        assert_eq!(json["items"][0]["item"], "Bread");
        assert_eq!(json["items"][0]["locked"], false);
    }

    #[test]
    fn test_legacy_uuid_accepts_numbers() {
        let model: ListModel =
            serde_json::from_value(json!({"uuid": 1234, "name": "Old", "sync": true})).unwrap();
        assert_eq!(model.uuid.unwrap().to_key(), "1234");
        assert_eq!(model.sync, Some(true));
        assert!(model.items.is_empty());
    }

    #[test]
    fn test_reset_without_interval_is_dropped() {
        let model: ResetModel = serde_json::from_value(json!({"active": true, "hour": 4})).unwrap();
        assert!(model.to_reset().is_none());

        let model: ResetModel =
            serde_json::from_value(json!({"active": true, "interval": "monthly", "day": 15})).unwrap();
        let reset = model.to_reset().unwrap();
        assert_eq!(reset.interval, ResetInterval::Monthly);
        assert_eq!(reset.day, 15);
        assert_eq!(reset.weekday, 1);
    }
}
