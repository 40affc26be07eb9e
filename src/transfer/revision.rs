//! Model revision dispatch and translation into entities.
//!
//! Every list and item model in an archive carries a `rev`. A missing
//! `rev` is the first revision. Parsing picks the matching model type;
//! translation turns it into a [`List`] or [`Listitem`] whose id already
//! points at the stored row it corresponds to, if there is one.
//!
//! Identity of an imported entity is resolved in this order:
//!
//! 1. a stored row whose `legacy_uuid` equals the model's `uuid`
//! 2. a stored row with the model's `id` and `created` time
//! 3. a stored row whose `legacy_uuid` is the correlation key left behind
//!    by an earlier import: `"{id}@{created}"`, or `"~{order}:{text}"`
//!    for a model that lacks `id` or `created`
//! 4. otherwise a fresh virtual id
//!
//! New rows keep the model's `uuid` as legacy uuid, or the correlation key
//! when the model has none, so that importing the same archive again
//! updates instead of duplicating. Items are only matched inside their
//! list, so two lists may hold items with the same content key.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{List, Listitem, RowId, now_millis};
use crate::storage::{LegacyMatch, ListsRepository};
use crate::transfer::types::{LegacyUuid, ListModel, ListitemModel};

/// Known model revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    V1,
}

impl Revision {
    /// Revision named by a model's `rev` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedRevision`] for anything but a missing
    /// value or `1`.
    pub fn of(rev: Option<&Value>) -> Result<Self> {
        match rev {
            None | Some(Value::Null) => Ok(Self::V1),
            Some(Value::Number(n)) if n.as_u64() == Some(1) => Ok(Self::V1),
            Some(Value::String(s)) if s.trim() == "1" => Ok(Self::V1),
            Some(other) => Err(Error::UnsupportedRevision {
                rev: other.to_string(),
            }),
        }
    }
}

/// A list model of a known revision.
#[derive(Debug, Clone, PartialEq)]
pub enum ListRevision {
    Rev1(ListModel),
}

impl ListRevision {
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedRevision`] for an unknown `rev`, or a
    /// JSON error if the value does not match the revision's model.
    pub fn parse(value: Value) -> Result<Self> {
        match Revision::of(value.get("rev"))? {
            Revision::V1 => Ok(Self::Rev1(serde_json::from_value(value)?)),
        }
    }
}

/// A listitem model of a known revision.
#[derive(Debug, Clone, PartialEq)]
pub enum ListitemRevision {
    Rev1(ListitemModel),
}

impl ListitemRevision {
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedRevision`] for an unknown `rev`, or a
    /// JSON error if the value does not match the revision's model.
    pub fn parse(value: Value) -> Result<Self> {
        match Revision::of(value.get("rev"))? {
            Revision::V1 => Ok(Self::Rev1(serde_json::from_value(value)?)),
        }
    }
}

/// Keys an imported entity can be recognized by.
#[derive(Debug, Clone, Default)]
struct Correlation {
    uuid: Option<String>,
    identity: Option<(i64, i64)>,
    key: Option<String>,
}

impl Correlation {
    fn new(uuid: Option<&LegacyUuid>, id: Option<i64>, created: Option<i64>) -> Self {
        let identity = id.zip(created);
        Self {
            uuid: uuid.map(LegacyUuid::to_key),
            identity,
            key: identity.map(|(id, created)| format!("{id}@{created}")),
        }
    }

    /// Fall back to a key built from the model's order and text when it has
    /// no `(id, created)` identity.
    fn or_content_key(mut self, order: Option<i64>, text: &str) -> Self {
        if self.key.is_none() {
            self.key = Some(format!("~{}:{text}", order.unwrap_or(0)));
        }
        self
    }

    fn candidates(&self) -> Vec<LegacyMatch<'_>> {
        let mut out = Vec::with_capacity(3);
        if let Some(uuid) = &self.uuid {
            out.push(LegacyMatch::Uuid(uuid));
        }
        if let Some((id, created)) = self.identity {
            out.push(LegacyMatch::Identity { id, created });
        }
        if let Some(key) = self.key.as_deref().filter(|k| self.uuid.as_deref() != Some(*k)) {
            out.push(LegacyMatch::Uuid(key));
        }
        out
    }

    fn legacy_uuid(&self) -> Option<String> {
        self.uuid.clone().or_else(|| self.key.clone())
    }
}

/// Turns parsed models into entities bound to one repository.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    repo: &'a ListsRepository,
    trash: bool,
}

impl<'a> Translator<'a> {
    /// `trash` selects whether lists land in trash (keeping or setting
    /// their `deleted` time) or among the active lists.
    #[must_use]
    pub const fn new(repo: &'a ListsRepository, trash: bool) -> Self {
        Self { repo, trash }
    }

    #[must_use]
    pub const fn repository(&self) -> &'a ListsRepository {
        self.repo
    }

    /// Build the list described by `revision`, with its items.
    ///
    /// Returns `Ok(None)` for a model without a name. Items that cannot be
    /// parsed are logged and left out; the list itself is still returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried for existing rows.
    pub async fn list(&self, revision: ListRevision) -> Result<Option<List>> {
        match revision {
            ListRevision::Rev1(model) => self.list_v1(model).await,
        }
    }

    /// Build the item described by `revision` for the list `list_id`.
    ///
    /// Stored rows are only matched inside that list; without a list id
    /// the item is always new. `trashed` items keep their archived
    /// `deleted` time, or get the current time when it is missing.
    ///
    /// Returns `Ok(None)` for a model without item text.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried for existing rows.
    pub async fn listitem(
        &self,
        list_id: Option<i64>,
        revision: ListitemRevision,
        trashed: bool,
    ) -> Result<Option<Listitem>> {
        match revision {
            ListitemRevision::Rev1(model) => self.listitem_v1(list_id, model, trashed).await,
        }
    }

    /// Stored id of the list an archived list (or trash group owner) with
    /// these keys corresponds to.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn find_list(
        &self,
        uuid: Option<&LegacyUuid>,
        id: Option<i64>,
        created: Option<i64>,
    ) -> Result<Option<i64>> {
        let correlation = Correlation::new(uuid, id, created);
        self.find_list_by(&correlation).await
    }

    async fn find_list_by(&self, correlation: &Correlation) -> Result<Option<i64>> {
        for candidate in correlation.candidates() {
            if let Some(found) = self.repo.find_list_id(candidate).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn list_v1(&self, model: ListModel) -> Result<Option<List>> {
        let Some(name) = model.name.clone().filter(|n| !n.trim().is_empty()) else {
            warn!(id = ?model.id, "Skipping list model without name");
            return Ok(None);
        };

        let correlation = Correlation::new(model.uuid.as_ref(), model.id, model.created)
            .or_content_key(model.order, &name);
        let id = self
            .find_list_by(&correlation)
            .await?
            .map_or_else(RowId::new_virtual, RowId::persisted);

        let now = now_millis();
        let mut list = List::new(name, model.order.unwrap_or(0));
        list.id = id;
        list.created = model.created.unwrap_or(now);
        list.modified = model.updated.unwrap_or(now);
        list.deleted = self.trash.then(|| model.deleted.unwrap_or(now));
        list.reset = model.reset.as_ref().and_then(|r| r.to_reset());
        list.sync_devices = model.sync_devices.clone().unwrap_or_default();
        list.legacy_uuid = correlation.legacy_uuid();
        if model.sync == Some(true) && list.sync_devices.is_empty() {
            debug!(list = %list.to_log(), "Archive marks list as synced without devices");
        }

        let list_id = id.as_persisted();
        for value in model.items {
            let item = match ListitemRevision::parse(value) {
                Ok(revision) => self.listitem(list_id, revision, false).await?,
                Err(e) => {
                    warn!(list = %list.to_log(), error = %e, "Skipping unreadable listitem");
                    None
                }
            };
            if let Some(mut item) = item {
                item.list_id = list_id;
                list.items.push(item);
            }
        }
        Ok(Some(list))
    }

    async fn listitem_v1(
        &self,
        list_id: Option<i64>,
        model: ListitemModel,
        trashed: bool,
    ) -> Result<Option<Listitem>> {
        let Some(text) = model.item.clone() else {
            warn!(id = ?model.id, "Skipping listitem model without text");
            return Ok(None);
        };

        let correlation = Correlation::new(model.uuid.as_ref(), model.id, model.created)
            .or_content_key(model.order, &text);
        let mut id = RowId::new_virtual();
        if list_id.is_some() {
            for candidate in correlation.candidates() {
                if let Some(found) = self.repo.find_listitem_id(list_id, candidate).await? {
                    id = RowId::persisted(found);
                    break;
                }
            }
        }

        let now = now_millis();
        let mut item = Listitem::new(text, model.order.unwrap_or(0));
        item.id = id;
        item.list_id = list_id;
        item.note = model.note.clone();
        item.hidden = model.hidden.unwrap_or(false);
        item.locked = model.locked.unwrap_or(false);
        item.created = model.created.unwrap_or(now);
        item.modified = model.updated.unwrap_or(now);
        item.deleted = trashed.then(|| model.deleted.unwrap_or(now));
        item.legacy_uuid = correlation.legacy_uuid();
        Ok(Some(item))
    }
}
