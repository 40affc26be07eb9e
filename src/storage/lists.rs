//! Lists and listitems repository.
//!
//! All reads and writes of the `lists` and `listitems` tables go through
//! [`ListsRepository`], which runs them on the shared [`ConnectionGuard`].
//! Multi-statement writes run inside one guard transaction.
//!
//! Every count-returning write reports the number of affected rows. `Ok(0)`
//! means nothing matched; a backend failure is always an `Err`.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{List, Listitem, RowId, now_millis};
use crate::storage::connection::ConnectionGuard;

const LISTS: &str = "lists";
const LISTITEMS: &str = "listitems";

// ── Query options ─────────────────────────────────────────────

/// Column lists and items can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListsOrder {
    Created,
    Modified,
    Deleted,
    #[default]
    Order,
}

impl ListsOrder {
    const fn column(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Order => "order",
        }
    }
}

impl std::str::FromStr for ListsOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            "order" => Ok(Self::Order),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown order column '{s}' (expected created, modified, deleted or order)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering of the items of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemsOrder {
    pub order_by: ListsOrder,
    pub order_dir: OrderDirection,
}

impl ItemsOrder {
    fn sql(self) -> String {
        format!(
            "ORDER BY `{}` {}, `id` ASC",
            self.order_by.column(),
            self.order_dir.sql()
        )
    }
}

/// Options of [`ListsRepository::query_lists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListsQuery {
    /// Only attach the number of active items instead of loading them.
    pub peek: bool,
    /// Query trashed lists instead of active ones.
    pub trash: bool,
    pub order_by: ListsOrder,
    pub order_dir: OrderDirection,
}

impl Default for ListsQuery {
    fn default() -> Self {
        Self {
            peek: true,
            trash: false,
            order_by: ListsOrder::Order,
            order_dir: OrderDirection::Asc,
        }
    }
}

/// Which items a count covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScope {
    List(i64),
    All,
}

/// Partition a permanent delete is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashFilter {
    #[default]
    Trashed,
    Active,
}

/// How an imported entity is matched against stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyMatch<'a> {
    /// Stored `legacy_uuid` equals the value.
    Uuid(&'a str),
    /// Row with this id and this creation time.
    Identity { id: i64, created: i64 },
}

// ── Results ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletedCounts {
    pub lists: usize,
    pub items: usize,
}

impl DeletedCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.lists + self.items
    }

    fn add(&mut self, other: Self) {
        self.lists += other.lists;
        self.items += other.items;
    }
}

/// Retention policy of [`ListsRepository::clean_up`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Purge trash deleted more than this many seconds ago.
    pub older_than: Option<u64>,
    /// Keep at most this many trashed lists, and at most this many trashed
    /// items per list.
    pub max_count: Option<usize>,
}

/// What each cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub by_age: DeletedCounts,
    pub by_count: DeletedCounts,
    pub orphans: usize,
}

impl CleanupStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.by_age.total() + self.by_count.total() + self.orphans
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionCounts {
    pub lists: usize,
    pub items: usize,
}

/// Number of lists and items in and out of trash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub lists: PartitionCounts,
    pub trash: PartitionCounts,
}

// ── Repository ────────────────────────────────────────────────

/// Repository over the `lists` and `listitems` tables.
#[derive(Debug, Clone)]
pub struct ListsRepository {
    db: Arc<ConnectionGuard>,
    max_trash_count: Option<usize>,
}

impl ListsRepository {
    #[must_use]
    pub fn new(db: Arc<ConnectionGuard>) -> Self {
        Self {
            db,
            max_trash_count: None,
        }
    }

    /// Cap on the number of trashed lists kept by cleanup.
    #[must_use]
    pub fn with_max_trash_count(mut self, max: Option<usize>) -> Self {
        self.max_trash_count = max;
        self
    }

    #[must_use]
    pub fn max_trash_count(&self) -> Option<usize> {
        self.max_trash_count
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionGuard> {
        &self.db
    }

    /// Open the store and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub async fn initialize(&self) -> Result<()> {
        self.db.open().await?;
        let count = self.query_lists_count(false).await?;
        debug!("Found {count} list(s) in backend");
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────

    /// All lists of one partition.
    ///
    /// Peeked lists carry only their active item count. Otherwise the
    /// active items are loaded, ordered like the lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_lists(&self, query: ListsQuery) -> Result<Vec<List>> {
        let order = ItemsOrder {
            order_by: query.order_by,
            order_dir: query.order_dir,
        };
        let sql = format!(
            "SELECT * FROM `lists` WHERE `deleted` {} {}",
            deleted_clause(query.trash),
            order.sql()
        );

        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut lists = stmt
                    .query_map([], List::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for list in &mut lists {
                    let id = list.id.raw();
                    if query.peek {
                        list.item_count = Some(count_items(conn, id, false)?);
                    } else {
                        list.items = load_items(conn, id, false, order)?;
                    }
                }
                Ok(lists)
            })
            .await
    }

    /// One active list with its active items.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_list(&self, list_id: i64, order: ItemsOrder) -> Result<Option<List>> {
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT * FROM `lists` WHERE `id` = ?1 AND `deleted` IS NULL LIMIT 1",
                )?;
                let list = stmt
                    .query_map([list_id], List::from_row)?
                    .next()
                    .transpose()?;
                let Some(mut list) = list else {
                    return Ok(None);
                };
                list.items = load_items(conn, list_id, false, order)?;
                Ok(Some(list))
            })
            .await
    }

    /// Items of a list, active or trashed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_listitems(
        &self,
        list_id: i64,
        trash: bool,
        order: ItemsOrder,
    ) -> Result<Vec<Listitem>> {
        self.db
            .with_connection(move |conn| load_items(conn, list_id, trash, order))
            .await
    }

    /// Every trashed item of every list, oldest deletion first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_trashed_listitems(&self) -> Result<Vec<Listitem>> {
        self.db
            .query(
                "SELECT * FROM `listitems` WHERE `deleted` IS NOT NULL ORDER BY `deleted` ASC, `id` ASC",
                vec![],
                Listitem::from_row,
            )
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_lists_count(&self, trash: bool) -> Result<usize> {
        self.db
            .with_connection(move |conn| count_lists(conn, trash))
            .await
    }

    /// Number of items of one list, or of all lists.
    ///
    /// For [`ItemScope::All`] in the trash partition, items count when either
    /// the item or its list is trashed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn query_listitems_count(&self, scope: ItemScope, trash: bool) -> Result<usize> {
        self.db
            .with_connection(move |conn| match scope {
                ItemScope::List(id) => count_items(conn, id, trash),
                ItemScope::All => count_all_items(conn, trash),
            })
            .await
    }

    /// Lists and items in and out of trash.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn database_stats(&self) -> Result<DatabaseStats> {
        self.db
            .with_connection(|conn| {
                Ok(DatabaseStats {
                    lists: PartitionCounts {
                        lists: count_lists(conn, false)?,
                        items: count_all_items(conn, false)?,
                    },
                    trash: PartitionCounts {
                        lists: count_lists(conn, true)?,
                        items: count_all_items(conn, true)?,
                    },
                })
            })
            .await
    }

    /// Size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be inspected.
    pub async fn database_size(&self) -> Result<u64> {
        self.db.database_size().await
    }

    /// `MAX(order) + 1` over the active lists, `0` when there are none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn next_list_order(&self) -> Result<i64> {
        let max = self
            .db
            .query_scalar(
                "SELECT MAX(`order`) FROM `lists` WHERE `deleted` IS NULL",
                vec![],
            )
            .await?;
        Ok(max.map_or(0, |o| o + 1))
    }

    /// `MAX(order) + 1` over the active items of a list, `0` when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn next_listitem_order(&self, list_id: i64) -> Result<i64> {
        self.db
            .with_connection(move |conn| next_item_order(conn, list_id))
            .await
    }

    /// Id of the list an imported entity corresponds to.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn find_list_id(&self, key: LegacyMatch<'_>) -> Result<Option<i64>> {
        let (sql, params) = match key {
            LegacyMatch::Uuid(uuid) => (
                "SELECT `id` FROM `lists` WHERE `legacy_uuid` = ?1 ORDER BY `id` LIMIT 1",
                vec![Value::from(uuid.to_string())],
            ),
            LegacyMatch::Identity { id, created } => (
                "SELECT `id` FROM `lists` WHERE `id` = ?1 AND `created` = ?2 LIMIT 1",
                vec![Value::from(id), Value::from(created)],
            ),
        };
        self.db.query_scalar(sql, params).await
    }

    /// Id of the item an imported entity corresponds to, restricted to one
    /// list when `list_id` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub async fn find_listitem_id(
        &self,
        list_id: Option<i64>,
        key: LegacyMatch<'_>,
    ) -> Result<Option<i64>> {
        let (mut sql, mut params) = match key {
            LegacyMatch::Uuid(uuid) => (
                "SELECT `id` FROM `listitems` WHERE `legacy_uuid` = ?".to_string(),
                vec![Value::from(uuid.to_string())],
            ),
            LegacyMatch::Identity { id, created } => (
                "SELECT `id` FROM `listitems` WHERE `id` = ? AND `created` = ?".to_string(),
                vec![Value::from(id), Value::from(created)],
            ),
        };
        if let Some(list_id) = list_id {
            sql.push_str(" AND `list_id` = ?");
            params.push(Value::from(list_id));
        }
        sql.push_str(" ORDER BY `id` LIMIT 1");
        self.db.query_scalar(&sql, params).await
    }

    // ── Writes ────────────────────────────────────────────────

    /// Insert or update a list and its changed items in one transaction.
    ///
    /// Returns `Ok(None)` without touching the store when the list is
    /// persisted, clean and `force` is false. Otherwise returns the list's
    /// persisted id. Virtual ids of the list and its items are replaced by
    /// the ids the store assigned, and everything is marked clean, only
    /// after the transaction committed. On failure the in-memory list is
    /// left as it was.
    ///
    /// A peeked list has no items loaded; only its row is written.
    ///
    /// # Errors
    ///
    /// Returns an error if any row cannot be written. Nothing is stored then.
    pub async fn store_list(&self, list: &mut List, force: bool) -> Result<Option<i64>> {
        if !force && !list.is_dirty() && !list.is_virtual() {
            return Ok(None);
        }

        let list_row = list.id;
        let list_columns = list.backend_columns();
        let items: Vec<(RowId, Vec<(&'static str, Value)>)> = if list.is_peek() {
            Vec::new()
        } else {
            list.items
                .iter()
                .filter(|item| force || item.is_virtual() || item.is_dirty())
                .map(|item| (item.id, item.backend_columns()))
                .collect()
        };

        let stored = self
            .db
            .transaction(move |tx| {
                let list_id = match list_row {
                    RowId::Virtual(_) => insert_row(tx, LISTS, &list_columns)?,
                    RowId::Persisted(id) => {
                        if update_row(tx, LISTS, id, &list_columns)? == 0 {
                            return Err(Error::ListNotFound { id });
                        }
                        id
                    }
                };

                let mut remap = HashMap::new();
                for (item_row, mut columns) in items {
                    set_column(&mut columns, "list_id", Value::from(list_id));
                    match item_row {
                        RowId::Virtual(_) => {
                            remap.insert(item_row, insert_row(tx, LISTITEMS, &columns)?);
                        }
                        RowId::Persisted(id) => {
                            if update_row(tx, LISTITEMS, id, &columns)? == 0 {
                                return Err(Error::ListitemNotFound { id });
                            }
                        }
                    }
                }
                Ok((list_id, remap))
            })
            .await;

        let (list_id, remap) = stored.inspect_err(|e| {
            error!(list = %list.to_log(), error = %e, "Could not store list in backend");
        })?;

        list.id = RowId::persisted(list_id);
        for item in &mut list.items {
            item.list_id = Some(list_id);
            if let Some(id) = remap.get(&item.id) {
                item.id = RowId::persisted(*id);
            }
        }
        list.clean();
        debug!(list = %list.to_log(), items = remap.len(), "Stored list");
        Ok(Some(list_id))
    }

    /// Write trashed items exactly as given, keeping their `deleted` time.
    ///
    /// Items are attached to `list_id`. Virtual items are inserted and
    /// receive their persisted id after commit.
    ///
    /// # Errors
    ///
    /// Returns an error if any row cannot be written. Nothing is stored then.
    pub async fn store_trashed_listitems(
        &self,
        list_id: i64,
        items: &mut [Listitem],
    ) -> Result<usize> {
        let rows: Vec<(RowId, Vec<(&'static str, Value)>)> = items
            .iter()
            .map(|item| (item.id, item.backend_columns()))
            .collect();

        let remap = self
            .db
            .transaction(move |tx| {
                let mut remap = HashMap::new();
                for (row, mut columns) in rows {
                    set_column(&mut columns, "list_id", Value::from(list_id));
                    match row {
                        RowId::Virtual(_) => {
                            remap.insert(row, insert_row(tx, LISTITEMS, &columns)?);
                        }
                        RowId::Persisted(id) => {
                            if update_row(tx, LISTITEMS, id, &columns)? == 0 {
                                return Err(Error::ListitemNotFound { id });
                            }
                        }
                    }
                }
                Ok(remap)
            })
            .await?;

        for item in items.iter_mut() {
            item.list_id = Some(list_id);
            if let Some(id) = remap.get(&item.id) {
                item.id = RowId::persisted(*id);
            }
            item.clean();
        }
        Ok(items.len())
    }

    /// Move active lists to trash. An empty `ids` slice trashes every
    /// active list.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn move_lists_to_trash(&self, ids: &[i64]) -> Result<usize> {
        let mut sql = "UPDATE `lists` SET `deleted` = ? WHERE `deleted` IS NULL".to_string();
        let mut params = vec![Value::from(now_millis())];
        push_id_filter(&mut sql, &mut params, ids);

        let changes = self.db.execute(&sql, params).await?;
        Ok(changes.changes)
    }

    /// Move active items of a list to trash. An empty `ids` slice means all
    /// items of the list. Locked items are skipped unless `force` is set.
    /// The list's `modified` time is bumped when anything moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn move_listitems_to_trash(
        &self,
        list_id: i64,
        ids: &[i64],
        force: bool,
    ) -> Result<usize> {
        let now = now_millis();
        let mut sql =
            "UPDATE `listitems` SET `deleted` = ? WHERE `list_id` = ? AND `deleted` IS NULL"
                .to_string();
        let mut params = vec![Value::from(now), Value::from(list_id)];
        push_id_filter(&mut sql, &mut params, ids);
        if !force {
            sql.push_str(" AND `locked` <> 1");
        }

        self.db
            .transaction(move |tx| {
                let changes = tx.execute(&sql, params_from_iter(params))?;
                if changes > 0 {
                    touch_list(tx, list_id, now)?;
                }
                Ok(changes)
            })
            .await
    }

    /// Permanently delete lists of one partition together with all of their
    /// items. An empty `ids` slice means every list of the partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated. Nothing is deleted
    /// then.
    pub async fn delete_lists(&self, ids: &[i64], filter: TrashFilter) -> Result<DeletedCounts> {
        let ids = ids.to_vec();
        self.db
            .transaction(move |tx| {
                let mut sql = format!(
                    "SELECT `id` FROM `lists` WHERE `deleted` {}",
                    deleted_clause(filter == TrashFilter::Trashed)
                );
                let mut params = Vec::new();
                push_id_filter(&mut sql, &mut params, &ids);
                let matching = select_ids(tx, &sql, params)?;
                delete_lists_with_items(tx, &matching)
            })
            .await
    }

    /// Permanently delete items of a list from one partition. An empty `ids`
    /// slice means every item of the partition. When deleting active items,
    /// locked ones are skipped unless `force` is set and the list's
    /// `modified` time is bumped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn delete_listitems(
        &self,
        list_id: i64,
        ids: &[i64],
        trash: bool,
        force: bool,
    ) -> Result<usize> {
        let mut sql = format!(
            "DELETE FROM `listitems` WHERE `list_id` = ? AND `deleted` {}",
            deleted_clause(trash)
        );
        let mut params = vec![Value::from(list_id)];
        push_id_filter(&mut sql, &mut params, ids);
        if !trash && !force {
            sql.push_str(" AND `locked` <> 1");
        }

        self.db
            .transaction(move |tx| {
                let changes = tx.execute(&sql, params_from_iter(params))?;
                if changes > 0 && !trash {
                    touch_list(tx, list_id, now_millis())?;
                }
                Ok(changes)
            })
            .await
    }

    /// Restore trashed lists. An empty `ids` slice restores all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn restore_lists_from_trash(&self, ids: &[i64]) -> Result<usize> {
        let mut sql =
            "UPDATE `lists` SET `deleted` = NULL, `modified` = ? WHERE `deleted` IS NOT NULL"
                .to_string();
        let mut params = vec![Value::from(now_millis())];
        push_id_filter(&mut sql, &mut params, ids);

        let changes = self.db.execute(&sql, params).await?;
        Ok(changes.changes)
    }

    /// Restore trashed items of a list. An empty `ids` slice restores all of
    /// them.
    ///
    /// Restored items are appended after the list's active items: in their
    /// previous relative order they receive `next, next + 1, ...` where
    /// `next` is the list's next free order value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated. Nothing is restored
    /// then.
    pub async fn restore_listitems_from_trash(&self, list_id: i64, ids: &[i64]) -> Result<usize> {
        let ids = ids.to_vec();
        self.db
            .transaction(move |tx| {
                let mut next = next_item_order(tx, list_id)?;
                let mut sql = "SELECT `id` FROM `listitems` WHERE `list_id` = ? AND `deleted` IS NOT NULL"
                    .to_string();
                let mut params = vec![Value::from(list_id)];
                push_id_filter(&mut sql, &mut params, &ids);
                sql.push_str(" ORDER BY `order` ASC, `id` ASC");
                let restore = select_ids(tx, &sql, params)?;

                let now = now_millis();
                let mut stmt = tx.prepare_cached(
                    "UPDATE `listitems` SET `deleted` = NULL, `order` = ?1, `modified` = ?2 WHERE `id` = ?3",
                )?;
                for id in &restore {
                    stmt.execute(rusqlite::params![next, now, id])?;
                    next += 1;
                }
                if !restore.is_empty() {
                    touch_list(tx, list_id, now)?;
                }
                Ok(restore.len())
            })
            .await
    }

    /// Delete every item of one partition, across all lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn wipe_listitems(&self, trash: bool) -> Result<usize> {
        let sql = format!(
            "DELETE FROM `listitems` WHERE `deleted` {}",
            deleted_clause(trash)
        );
        let changes = self.db.execute(&sql, vec![]).await?;
        Ok(changes.changes)
    }

    /// Apply the trash retention policy and remove orphaned items.
    ///
    /// The age pass purges trashed lists (with all their items) and trashed
    /// items deleted before `now - older_than`. The count pass keeps only the
    /// `max_count` most recently trashed lists, and per list only the
    /// `max_count` most recently trashed items. The orphan pass always runs
    /// and deletes items whose list no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails. Passes that completed before stay
    /// applied.
    pub async fn clean_up(&self, policy: CleanupPolicy) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();

        if let Some(older_than) = policy.older_than.filter(|s| *s > 0) {
            let ts = now_millis() - i64::try_from(older_than.saturating_mul(1000)).unwrap_or(i64::MAX);
            stats.by_age = self
                .db
                .transaction(move |tx| {
                    let ids = select_ids(
                        tx,
                        "SELECT `id` FROM `lists` WHERE `deleted` IS NOT NULL AND `deleted` < ?",
                        vec![Value::from(ts)],
                    )?;
                    let mut deleted = delete_lists_with_items(tx, &ids)?;
                    deleted.items += tx.execute(
                        "DELETE FROM `listitems` WHERE `deleted` IS NOT NULL AND `deleted` < ?1",
                        [ts],
                    )?;
                    Ok(deleted)
                })
                .await?;
            if stats.by_age.total() > 0 {
                info!(
                    lists = stats.by_age.lists,
                    items = stats.by_age.items,
                    older_than,
                    "Backend cleanup: purged trash by age"
                );
            }
        }

        if let Some(max_count) = policy.max_count.filter(|c| *c > 0) {
            let max = i64::try_from(max_count).unwrap_or(i64::MAX);
            stats.by_count = self
                .db
                .transaction(move |tx| {
                    let ids = select_ids(
                        tx,
                        "SELECT `id` FROM `lists` WHERE `deleted` IS NOT NULL ORDER BY `deleted` DESC, `id` DESC LIMIT -1 OFFSET ?",
                        vec![Value::from(max)],
                    )?;
                    let mut deleted = delete_lists_with_items(tx, &ids)?;
                    deleted.items += tx.execute(
                        "DELETE FROM `listitems` WHERE `id` IN (
                            SELECT `id` FROM (
                                SELECT `id`, ROW_NUMBER() OVER (
                                    PARTITION BY `list_id` ORDER BY `deleted` DESC, `id` DESC
                                ) AS `row_num`
                                FROM `listitems` WHERE `deleted` IS NOT NULL
                            ) WHERE `row_num` > ?1
                        )",
                        [max],
                    )?;
                    Ok(deleted)
                })
                .await?;
            if stats.by_count.total() > 0 {
                info!(
                    lists = stats.by_count.lists,
                    items = stats.by_count.items,
                    max_count,
                    "Backend cleanup: purged trash beyond maximum count"
                );
            }
        }

        let orphans = self
            .db
            .execute(
                "DELETE FROM `listitems` WHERE `list_id` NOT IN (SELECT `id` FROM `lists`)",
                vec![],
            )
            .await?;
        stats.orphans = orphans.changes;
        if stats.orphans > 0 {
            warn!(count = stats.orphans, "Deleted orphan listitem(s) in backend");
        }

        if stats.total() > 0 {
            info!(total = stats.total(), "Backend cleanup finished");
        }
        Ok(stats)
    }
}

// ── Statement helpers ─────────────────────────────────────────
//
// These take a plain connection so they can run both inside
// `with_connection` and inside a transaction callback.

fn deleted_clause(trash: bool) -> &'static str {
    if trash { "IS NOT NULL" } else { "IS NULL" }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_id_filter(sql: &mut String, params: &mut Vec<Value>, ids: &[i64]) {
    if !ids.is_empty() {
        sql.push_str(&format!(" AND `id` IN ({})", placeholders(ids.len())));
        params.extend(ids.iter().copied().map(Value::from));
    }
}

fn set_column(columns: &mut [(&'static str, Value)], name: &str, value: Value) {
    if let Some(slot) = columns.iter_mut().find(|(c, _)| *c == name) {
        slot.1 = value;
    }
}

fn insert_row(conn: &Connection, table: &str, columns: &[(&'static str, Value)]) -> Result<i64> {
    let names = columns
        .iter()
        .map(|(c, _)| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO `{table}` ({names}) VALUES ({})",
        placeholders(columns.len())
    );
    conn.execute(&sql, params_from_iter(columns.iter().map(|(_, v)| v)))?;
    Ok(conn.last_insert_rowid())
}

fn update_row(
    conn: &Connection,
    table: &str,
    id: i64,
    columns: &[(&'static str, Value)],
) -> Result<usize> {
    let assignments = columns
        .iter()
        .map(|(c, _)| format!("`{c}` = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE `{table}` SET {assignments} WHERE `id` = ?");
    let params = columns
        .iter()
        .map(|(_, v)| v.clone())
        .chain(std::iter::once(Value::from(id)));
    Ok(conn.execute(&sql, params_from_iter(params))?)
}

fn select_ids(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params_from_iter(params), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn delete_lists_with_items(conn: &Connection, ids: &[i64]) -> Result<DeletedCounts> {
    let mut deleted = DeletedCounts::default();
    // Bound the number of host parameters per statement.
    for chunk in ids.chunks(500) {
        let ph = placeholders(chunk.len());
        let lists = conn.execute(
            &format!("DELETE FROM `lists` WHERE `id` IN ({ph})"),
            params_from_iter(chunk),
        )?;
        let items = conn.execute(
            &format!("DELETE FROM `listitems` WHERE `list_id` IN ({ph})"),
            params_from_iter(chunk),
        )?;
        deleted.add(DeletedCounts { lists, items });
    }
    Ok(deleted)
}

fn load_items(
    conn: &Connection,
    list_id: i64,
    trash: bool,
    order: ItemsOrder,
) -> Result<Vec<Listitem>> {
    let sql = format!(
        "SELECT * FROM `listitems` WHERE `list_id` = ?1 AND `deleted` {} {}",
        deleted_clause(trash),
        order.sql()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let items = stmt
        .query_map([list_id], Listitem::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

fn count_items(conn: &Connection, list_id: i64, trash: bool) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM `listitems` WHERE `list_id` = ?1 AND `deleted` {}",
        deleted_clause(trash)
    );
    let count: i64 = conn.query_row(&sql, [list_id], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn count_all_items(conn: &Connection, trash: bool) -> Result<usize> {
    let sql = if trash {
        "SELECT COUNT(*) FROM `listitems` JOIN `lists` ON `listitems`.`list_id` = `lists`.`id` \
         WHERE `listitems`.`deleted` IS NOT NULL OR `lists`.`deleted` IS NOT NULL"
    } else {
        "SELECT COUNT(*) FROM `listitems` JOIN `lists` ON `listitems`.`list_id` = `lists`.`id` \
         WHERE `listitems`.`deleted` IS NULL AND `lists`.`deleted` IS NULL"
    };
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn count_lists(conn: &Connection, trash: bool) -> Result<usize> {
    let sql = format!(
        "SELECT COUNT(*) FROM `lists` WHERE `deleted` {}",
        deleted_clause(trash)
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn next_item_order(conn: &Connection, list_id: i64) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(`order`) FROM `listitems` WHERE `list_id` = ?1 AND `deleted` IS NULL",
        [list_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |o| o + 1))
}

fn touch_list(conn: &Connection, list_id: i64, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE `lists` SET `modified` = ?1 WHERE `id` = ?2",
        rusqlite::params![now, list_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListReset, ResetInterval, SyncDevice};

    fn repo() -> ListsRepository {
        ListsRepository::new(Arc::new(ConnectionGuard::memory()))
    }

    async fn store_groceries(repo: &ListsRepository) -> List {
        let mut list = List::new("Groceries", 0);
        list.add_item(Listitem::new("Bread", 0));
        let mut milk = Listitem::new("Milk", 1);
        milk.set_locked(true);
        list.add_item(milk);
        list.add_item(Listitem::new("Eggs", 2));
        repo.store_list(&mut list, false).await.unwrap();
        list
    }

    async fn deleted_of_list(repo: &ListsRepository, id: i64) -> Option<i64> {
        repo.connection()
            .query_scalar("SELECT `deleted` FROM `lists` WHERE `id` = ?1", vec![Value::from(id)])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_list_remaps_virtual_ids() {
        let repo = repo();
        let list = store_groceries(&repo).await;

        assert!(!list.is_virtual());
        assert!(!list.is_dirty());
        let list_id = list.id().as_persisted().unwrap();
        assert!(list_id > 0);
        for item in list.items() {
            assert!(item.id().as_persisted().unwrap() > 0);
            assert_eq!(item.list_id(), Some(list_id));
        }

        let stored = repo.query_list(list_id, ItemsOrder::default()).await.unwrap().unwrap();
        let ids: Vec<_> = stored.items().iter().map(Listitem::id).collect();
        let mem: Vec<_> = list.items().iter().map(Listitem::id).collect();
        assert_eq!(ids, mem);
    }

    #[tokio::test]
    async fn test_store_clean_list_is_noop() {
        let repo = repo();
        let mut list = store_groceries(&repo).await;
        assert_eq!(repo.store_list(&mut list, false).await.unwrap(), None);
        assert!(repo.store_list(&mut list, true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_updates_changed_item_only() {
        let repo = repo();
        let mut list = store_groceries(&repo).await;
        list.items_mut()[0].set_item("Rye bread");
        list.add_item(Listitem::new("Butter", 3));
        let id = repo.store_list(&mut list, false).await.unwrap().unwrap();

        let stored = repo.query_list(id, ItemsOrder::default()).await.unwrap().unwrap();
        let names: Vec<_> = stored.items().iter().map(Listitem::item).collect();
        assert_eq!(names, vec!["Rye bread", "Milk", "Eggs", "Butter"]);
    }

    #[tokio::test]
    async fn test_failed_store_leaves_memory_untouched() {
        let repo = repo();
        let mut list = store_groceries(&repo).await;
        let list_id = list.id().as_persisted().unwrap();
        repo.delete_lists(&[list_id], TrashFilter::Active).await.unwrap();

        list.set_name("Gone");
        list.add_item(Listitem::new("Tea", 5));
        let err = repo.store_list(&mut list, false).await.unwrap_err();
        assert!(matches!(err, Error::ListNotFound { .. }));
        assert!(list.items().last().unwrap().is_virtual());
        assert!(list.is_dirty());
        assert_eq!(repo.query_listitems_count(ItemScope::All, false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_and_sync_devices_round_trip() {
        let repo = repo();
        let mut list = List::new("Weekly", 0);
        list.set_reset(Some(ListReset {
            active: true,
            interval: ResetInterval::Weekly,
            hour: 7,
            minute: 15,
            day: 1,
            weekday: 3,
        }));
        list.set_sync_devices(vec![SyncDevice {
            id: 42,
            name: "Fenix".into(),
        }]);
        let id = repo.store_list(&mut list, false).await.unwrap().unwrap();

        let stored = repo.query_list(id, ItemsOrder::default()).await.unwrap().unwrap();
        assert_eq!(stored.reset(), list.reset());
        assert_eq!(stored.sync_devices(), list.sync_devices());
    }

    #[tokio::test]
    async fn test_query_lists_peek_and_full() {
        let repo = repo();
        store_groceries(&repo).await;
        let mut other = List::new("Hardware", 1);
        repo.store_list(&mut other, false).await.unwrap();

        let peeked = repo.query_lists(ListsQuery::default()).await.unwrap();
        assert_eq!(peeked.len(), 2);
        assert!(peeked[0].is_peek());
        assert_eq!(peeked[0].item_count(), 3);
        assert!(peeked[0].items().is_empty());

        let full = repo
            .query_lists(ListsQuery {
                peek: false,
                order_dir: OrderDirection::Desc,
                ..ListsQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(full[0].name(), "Hardware");
        assert_eq!(full[1].items().len(), 3);
        // items follow the same direction
        assert_eq!(full[1].items()[0].item(), "Eggs");
    }

    #[tokio::test]
    async fn test_trash_and_restore_lists() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();

        assert_eq!(repo.move_lists_to_trash(&[id]).await.unwrap(), 1);
        assert!(deleted_of_list(&repo, id).await.is_some());
        assert!(repo.query_list(id, ItemsOrder::default()).await.unwrap().is_none());
        // second call matches nothing
        assert_eq!(repo.move_lists_to_trash(&[id]).await.unwrap(), 0);
        assert_eq!(repo.query_lists_count(true).await.unwrap(), 1);

        assert_eq!(repo.restore_lists_from_trash(&[id]).await.unwrap(), 1);
        assert!(deleted_of_list(&repo, id).await.is_none());
        let restored = repo.query_list(id, ItemsOrder::default()).await.unwrap().unwrap();
        assert!(restored.modified() >= list.modified());
        assert_eq!(repo.restore_lists_from_trash(&[id]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_locked_items_protected_from_trash() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();

        assert_eq!(repo.move_listitems_to_trash(id, &[], false).await.unwrap(), 2);
        assert_eq!(repo.move_listitems_to_trash(id, &[], false).await.unwrap(), 0);
        assert_eq!(repo.move_listitems_to_trash(id, &[], true).await.unwrap(), 1);
        assert_eq!(repo.query_listitems_count(ItemScope::List(id), true).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_listitems_respects_lock() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();

        assert_eq!(repo.delete_listitems(id, &[], false, false).await.unwrap(), 2);
        assert_eq!(repo.delete_listitems(id, &[], false, true).await.unwrap(), 1);
        assert_eq!(repo.query_listitems_count(ItemScope::List(id), false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_items_resequences_order() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        let bread = list.items()[0].id().raw();
        let eggs = list.items()[2].id().raw();

        repo.move_listitems_to_trash(id, &[bread, eggs], false).await.unwrap();
        // Milk (order 1) stays, new active items get 2 and 3
        let mut current = repo.query_list(id, ItemsOrder::default()).await.unwrap().unwrap();
        current.add_item(Listitem::new("Jam", 2));
        current.add_item(Listitem::new("Honey", 3));
        repo.store_list(&mut current, false).await.unwrap();

        assert_eq!(repo.restore_listitems_from_trash(id, &[]).await.unwrap(), 2);
        let items = repo.query_listitems(id, false, ItemsOrder::default()).await.unwrap();
        let orders: Vec<_> = items.iter().map(|i| (i.item().to_string(), i.order())).collect();
        assert_eq!(
            orders,
            vec![
                ("Milk".to_string(), 1),
                ("Jam".to_string(), 2),
                ("Honey".to_string(), 3),
                ("Bread".to_string(), 4),
                ("Eggs".to_string(), 5),
            ]
        );
        assert_eq!(repo.restore_listitems_from_trash(id, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_only_touches_trashed_items() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        let milk = list.items()[1].id().raw();

        assert_eq!(repo.restore_listitems_from_trash(id, &[milk]).await.unwrap(), 0);
        let items = repo.query_listitems(id, false, ItemsOrder::default()).await.unwrap();
        assert_eq!(items[1].order(), 1);
    }

    #[tokio::test]
    async fn test_delete_lists_cascades_and_respects_partition() {
        let repo = repo();
        let active = store_groceries(&repo).await;
        let trashed = store_groceries(&repo).await;
        let active_id = active.id().as_persisted().unwrap();
        let trashed_id = trashed.id().as_persisted().unwrap();
        repo.move_lists_to_trash(&[trashed_id]).await.unwrap();

        // an active list is not touched by a trash-only delete
        let counts = repo
            .delete_lists(&[active_id, trashed_id], TrashFilter::Trashed)
            .await
            .unwrap();
        assert_eq!(counts, DeletedCounts { lists: 1, items: 3 });
        assert_eq!(
            repo.query_listitems_count(ItemScope::List(active_id), false).await.unwrap(),
            3
        );

        let counts = repo.delete_lists(&[], TrashFilter::Active).await.unwrap();
        assert_eq!(counts, DeletedCounts { lists: 1, items: 3 });
        assert_eq!(repo.database_stats().await.unwrap(), DatabaseStats::default());
    }

    #[tokio::test]
    async fn test_next_order_values() {
        let repo = repo();
        assert_eq!(repo.next_list_order().await.unwrap(), 0);
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        assert_eq!(repo.next_list_order().await.unwrap(), 1);
        assert_eq!(repo.next_listitem_order(id).await.unwrap(), 3);
        assert_eq!(repo.next_listitem_order(id + 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_most_recent_trashed_lists() {
        let repo = repo();
        let mut ids = Vec::new();
        for n in 0..5 {
            let mut list = List::new(format!("List {n}"), n);
            list.add_item(Listitem::new("x", 0));
            ids.push(repo.store_list(&mut list, false).await.unwrap().unwrap());
        }
        // deleted at T1 < T2 < ... < T5
        for (n, id) in ids.iter().enumerate() {
            repo.connection()
                .execute(
                    "UPDATE `lists` SET `deleted` = ?1 WHERE `id` = ?2",
                    vec![Value::from(1_000 + i64::try_from(n).unwrap()), Value::from(*id)],
                )
                .await
                .unwrap();
        }

        let stats = repo
            .clean_up(CleanupPolicy {
                older_than: None,
                max_count: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(stats.by_count, DeletedCounts { lists: 3, items: 3 });

        let kept: Vec<i64> = repo
            .query_lists(ListsQuery {
                trash: true,
                ..ListsQuery::default()
            })
            .await
            .unwrap()
            .iter()
            .filter_map(|l| l.id().as_persisted())
            .collect();
        assert_eq!(kept, vec![ids[3], ids[4]]);
    }

    #[tokio::test]
    async fn test_cleanup_by_age_and_orphans() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        repo.move_listitems_to_trash(id, &[], false).await.unwrap();
        repo.connection()
            .execute(
                "UPDATE `listitems` SET `deleted` = 1 WHERE `deleted` IS NOT NULL",
                vec![],
            )
            .await
            .unwrap();
        repo.connection()
            .execute(
                "INSERT INTO `listitems` (`list_id`, `item`, `created`, `modified`) VALUES (9999, 'orphan', 1, 1)",
                vec![],
            )
            .await
            .unwrap();

        let stats = repo
            .clean_up(CleanupPolicy {
                older_than: Some(60),
                max_count: None,
            })
            .await
            .unwrap();
        assert_eq!(stats.by_age, DeletedCounts { lists: 0, items: 2 });
        assert_eq!(stats.orphans, 1);
        assert_eq!(repo.query_listitems_count(ItemScope::List(id), false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_limits_trashed_items_per_list() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        repo.move_listitems_to_trash(id, &[], true).await.unwrap();

        let stats = repo
            .clean_up(CleanupPolicy {
                older_than: None,
                max_count: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(stats.by_count.items, 2);
        assert_eq!(repo.query_listitems_count(ItemScope::List(id), true).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats_count_items_of_trashed_lists_as_trash() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();
        repo.move_lists_to_trash(&[id]).await.unwrap();

        let stats = repo.database_stats().await.unwrap();
        assert_eq!(stats.lists, PartitionCounts { lists: 0, items: 0 });
        assert_eq!(stats.trash, PartitionCounts { lists: 1, items: 3 });
    }

    #[tokio::test]
    async fn test_find_ids_by_legacy_match() {
        let repo = repo();
        let mut list = List::new("Imported", 0);
        list.legacy_uuid = Some("abc-123".into());
        let id = repo.store_list(&mut list, false).await.unwrap().unwrap();

        assert_eq!(repo.find_list_id(LegacyMatch::Uuid("abc-123")).await.unwrap(), Some(id));
        assert_eq!(repo.find_list_id(LegacyMatch::Uuid("nope")).await.unwrap(), None);
        assert_eq!(
            repo.find_list_id(LegacyMatch::Identity {
                id,
                created: list.created()
            })
            .await
            .unwrap(),
            Some(id)
        );
        assert_eq!(
            repo.find_list_id(LegacyMatch::Identity {
                id,
                created: list.created() + 1
            })
            .await
            .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_store_trashed_items_keeps_deleted() {
        let repo = repo();
        let list = store_groceries(&repo).await;
        let id = list.id().as_persisted().unwrap();

        let mut item = Listitem::new("Old", 9);
        item.deleted = Some(12_345);
        let mut items = vec![item];
        assert_eq!(repo.store_trashed_listitems(id, &mut items).await.unwrap(), 1);
        assert!(!items[0].is_virtual());

        let trashed = repo.query_listitems(id, true, ItemsOrder::default()).await.unwrap();
        assert_eq!(trashed.len(), 1);
        assert_eq!(trashed[0].deleted(), Some(12_345));
    }

    #[test]
    fn test_order_column_parse() {
        assert_eq!("modified".parse::<ListsOrder>().unwrap(), ListsOrder::Modified);
        assert!("name; DROP TABLE lists".parse::<ListsOrder>().is_err());
    }
}
