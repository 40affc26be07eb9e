//! Export of lists, trash and settings into a zip archive.
//!
//! An export run writes one JSON file per list into a working directory
//! below the cache, then [`Exporter::finalize`] zips that directory and
//! copies the archive into the documents directory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{List, Listitem};
use crate::prefs::Preferences;
use crate::storage::{ListsQuery, ListsRepository};
use crate::transfer::file::{
    atomic_write, entity_filename, remove_dir_if_exists, unique_destination, zip_dir,
};
use crate::transfer::progress::ProgressListener;
use crate::transfer::types::{
    LISTS_DIR, LegacyUuid, ListModel, ListitemModel, SETTINGS_FILE, TRASH_DIR, TRASH_ITEMS_DIR,
    TrashGroupModel,
};

/// Base name of the archive, in the cache and in the documents directory.
pub const ARCHIVE_BASENAME: &str = "lists-export";

/// Lifecycle of an [`Exporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Uninitialized,
    Running,
    Finalizing,
    Done,
    Stopped,
}

impl ExportState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests a running export to stop from another task.
///
/// The export loops check the flag between two file writes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Writes an export archive from a [`ListsRepository`].
#[derive(Debug)]
pub struct Exporter {
    repo: ListsRepository,
    export_dir: PathBuf,
    documents_dir: PathBuf,
    state: ExportState,
    stop: StopHandle,
    archive: Option<PathBuf>,
}

impl Exporter {
    /// Exporter working below `<cache_dir>/export` and delivering into
    /// `documents_dir`.
    #[must_use]
    pub fn new(repo: ListsRepository, cache_dir: &Path, documents_dir: &Path) -> Self {
        Self {
            repo,
            export_dir: cache_dir.join("export"),
            documents_dir: documents_dir.to_path_buf(),
            state: ExportState::Uninitialized,
            stop: StopHandle::default(),
            archive: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ExportState {
        self.state
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Directory the per-entity files are written to.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.export_dir.join("temp")
    }

    /// Archive inside the cache, before it is copied to the documents.
    #[must_use]
    pub fn cache_archive(&self) -> PathBuf {
        self.export_dir.join(format!("{ARCHIVE_BASENAME}.zip"))
    }

    /// Archive copied to the documents directory by the last finalize.
    #[must_use]
    pub fn archive(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Clear leftovers of an earlier run and start a new one.
    ///
    /// # Errors
    ///
    /// Returns an error while an archive is being finalized, or if the
    /// working directory cannot be prepared.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state == ExportState::Finalizing {
            return Err(self.wrong_state("not finalizing"));
        }
        let work = self.work_dir();
        remove_dir_if_exists(&work)?;
        fs::create_dir_all(&work)?;
        self.stop.reset();
        self.archive = None;
        self.state = ExportState::Running;
        info!(dir = %work.display(), "Export initialized");
        Ok(())
    }

    /// Write every active list with its items to `lists/lists/`.
    ///
    /// Returns the number of list files written.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is not running or the lists cannot
    /// be read. A list that cannot be written is counted failed instead.
    pub async fn export_lists(&mut self, listener: &mut ProgressListener) -> Result<usize> {
        self.ensure_running()?;
        let lists = self
            .repo
            .query_lists(ListsQuery {
                peek: false,
                ..ListsQuery::default()
            })
            .await?;
        listener.init(lists.iter().map(|l| 1 + l.items().len()).sum());

        let dir = self.work_dir().join(LISTS_DIR);
        let written = self.write_lists(&dir, &lists, listener);
        info!(written, failed = listener.failed(), "Exported lists");
        Ok(written)
    }

    /// Write every trashed list to `lists/trash/` and the trashed items of
    /// each list to `lists/trash/items/<list id>.json`.
    ///
    /// Returns the number of files written.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is not running or the trash cannot
    /// be read.
    pub async fn export_trash(&mut self, listener: &mut ProgressListener) -> Result<usize> {
        self.ensure_running()?;
        let lists = self
            .repo
            .query_lists(ListsQuery {
                peek: false,
                trash: true,
                ..ListsQuery::default()
            })
            .await?;
        let items = self.repo.query_trashed_listitems().await?;

        let mut groups: BTreeMap<i64, Vec<Listitem>> = BTreeMap::new();
        for item in items {
            match item.list_id() {
                Some(list_id) => groups.entry(list_id).or_default().push(item),
                None => warn!(item = %item.to_log(), "Trashed listitem without list"),
            }
        }
        listener.init(
            lists.iter().map(|l| 1 + l.items().len()).sum::<usize>()
                + groups.values().map(Vec::len).sum::<usize>(),
        );

        let trash_dir = self.work_dir().join(TRASH_DIR);
        let mut written = self.write_lists(&trash_dir, &lists, listener);
        if self.state != ExportState::Running {
            return Ok(written);
        }

        // owners of trashed items may be active or trashed themselves
        let mut owners: HashMap<i64, (Option<String>, i64)> = HashMap::new();
        for trash in [false, true] {
            let peeked = self
                .repo
                .query_lists(ListsQuery {
                    trash,
                    ..ListsQuery::default()
                })
                .await?;
            for list in peeked {
                owners.insert(
                    list.id().raw(),
                    (list.legacy_uuid().map(str::to_string), list.created()),
                );
            }
        }

        let dir = self.work_dir().join(TRASH_ITEMS_DIR);
        for (list_id, items) in groups {
            if self.check_stop() {
                break;
            }
            let n = items.len();
            let owner = owners.get(&list_id);
            if owner.is_none() {
                warn!(list_id, items = n, "Exporting trashed listitems of a missing list");
            }
            let group = TrashGroupModel {
                id: Some(list_id),
                uuid: owner.and_then(|(uuid, _)| uuid.clone()).map(LegacyUuid::Text),
                created: owner.map(|(_, created)| *created),
                items: items
                    .iter()
                    .map(|item| serde_json::to_value(ListitemModel::from_item(item)))
                    .collect::<serde_json::Result<_>>()?,
            };
            match write_json(&dir.join(format!("{list_id}.json")), &group) {
                Ok(()) => {
                    written += 1;
                    listener.one_success(n);
                }
                Err(e) => {
                    warn!(list_id, error = %e, "Could not export trashed listitems");
                    listener.one_failed(n);
                }
            }
            listener.one_done(n);
        }
        info!(written, failed = listener.failed(), "Exported trash");
        Ok(written)
    }

    /// Write every stored preference to `settings.json`.
    ///
    /// Returns the number of preferences written.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is not running or the file cannot
    /// be written.
    pub fn export_settings(
        &mut self,
        prefs: &dyn Preferences,
        listener: &mut ProgressListener,
    ) -> Result<usize> {
        self.ensure_running()?;
        let settings = prefs.export();
        let n = settings.len();
        listener.init(n);

        if let Err(e) = write_json(&self.work_dir().join(SETTINGS_FILE), &settings) {
            listener.one_failed(n);
            listener.one_done(n);
            return Err(e);
        }
        listener.one_success(n);
        listener.one_done(n);
        info!(count = n, "Exported settings");
        Ok(n)
    }

    /// Zip the working directory and copy the archive to the documents
    /// directory. Returns the path of the copy.
    ///
    /// An existing file of the same name is kept; the copy then gets a
    /// timestamp suffix. The working directory and the cached archive are
    /// removed once the copy is in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter is not running. A failure while
    /// zipping or copying stops the exporter and is returned.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        self.ensure_running()?;
        self.state = ExportState::Finalizing;

        match self.pack() {
            Ok(destination) => {
                info!(archive = %destination.display(), "Export finished");
                self.archive = Some(destination.clone());
                self.state = ExportState::Done;
                if let Err(e) = self.clean_up(false) {
                    warn!(error = %e, "Could not remove export working files");
                }
                Ok(destination)
            }
            Err(e) => {
                error!(error = %e, "Could not finalize export");
                self.state = ExportState::Stopped;
                Err(e)
            }
        }
    }

    /// Stop the export and drop its working directory. Repeated calls are
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be removed.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.stop();
        if self.state != ExportState::Done {
            self.state = ExportState::Stopped;
        }
        remove_dir_if_exists(&self.work_dir())?;
        debug!(state = %self.state, "Export stopped");
        Ok(())
    }

    /// Remove the working directory and the cached archive, and with
    /// `delete_archive` also the copy in the documents directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn clean_up(&mut self, delete_archive: bool) -> Result<()> {
        remove_dir_if_exists(&self.work_dir())?;
        remove_file_if_exists(&self.cache_archive())?;
        if delete_archive {
            if let Some(archive) = self.archive.take() {
                remove_file_if_exists(&archive)?;
                debug!(archive = %archive.display(), "Removed exported archive");
            }
        }
        Ok(())
    }

    fn pack(&self) -> Result<PathBuf> {
        let cache_archive = self.cache_archive();
        let files = zip_dir(&self.work_dir(), &cache_archive)?;
        debug!(files, archive = %cache_archive.display(), "Packed export");

        fs::create_dir_all(&self.documents_dir)?;
        let destination = unique_destination(&self.documents_dir, ARCHIVE_BASENAME, "zip", Local::now());
        fs::copy(&cache_archive, &destination)?;
        Ok(destination)
    }

    fn write_lists(&mut self, dir: &Path, lists: &[List], listener: &mut ProgressListener) -> usize {
        let mut written = 0;
        for list in lists {
            if self.check_stop() {
                break;
            }
            let n = 1 + list.items().len();
            let result = ListModel::from_list(list)
                .map_err(Error::from)
                .and_then(|model| {
                    write_json(&dir.join(entity_filename(list.id().raw(), list.name())), &model)
                });
            match result {
                Ok(()) => {
                    written += 1;
                    listener.one_success(n);
                }
                Err(e) => {
                    warn!(list = %list.to_log(), error = %e, "Could not export list");
                    listener.one_failed(n);
                }
            }
            listener.one_done(n);
        }
        written
    }

    /// Move to `Stopped` when a stop was requested through a handle.
    fn check_stop(&mut self) -> bool {
        if self.stop.is_stopped() {
            if self.state == ExportState::Running {
                info!("Export stopped on request");
                self.state = ExportState::Stopped;
            }
            return true;
        }
        false
    }

    fn ensure_running(&mut self) -> Result<()> {
        self.check_stop();
        if self.state == ExportState::Running {
            Ok(())
        } else {
            Err(self.wrong_state("running"))
        }
    }

    fn wrong_state(&self, expected: &'static str) -> Error {
        Error::InvalidState {
            expected,
            actual: self.state.to_string(),
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, &json)?;
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{JsonPreferences, PrefKey};
    use crate::storage::ConnectionGuard;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn repo() -> ListsRepository {
        ListsRepository::new(Arc::new(ConnectionGuard::memory()))
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let temp = TempDir::new().unwrap();
        let mut exporter = Exporter::new(repo(), temp.path(), temp.path());
        let mut listener = ProgressListener::new();
        assert!(matches!(
            exporter.export_lists(&mut listener).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(exporter.finalize().is_err());
    }

    #[tokio::test]
    async fn test_export_lists_layout() {
        let temp = TempDir::new().unwrap();
        let repo = repo();
        let mut list = List::new("Groceries", 0);
        list.add_item(Listitem::new("Bread", 0));
        let mut milk = Listitem::new("Milk", 1);
        milk.set_locked(true);
        list.add_item(milk);
        let id = repo.store_list(&mut list, false).await.unwrap().unwrap();

        let mut exporter = Exporter::new(repo, &temp.path().join("cache"), &temp.path().join("docs"));
        exporter.initialize().unwrap();
        let mut listener = ProgressListener::new();
        assert_eq!(exporter.export_lists(&mut listener).await.unwrap(), 1);
        assert_eq!((listener.total(), listener.success(), listener.failed()), (3, 3, 0));

        let file = exporter.work_dir().join(LISTS_DIR).join(format!("{id}-Groceries.json"));
        let json = read_json(&file);
        assert_eq!(json["rev"], 1);
        assert_eq!(json["id"], id);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
        assert_eq!(json["items"][1]["locked"], true);
    }

    #[tokio::test]
    async fn test_export_trash_groups_items() {
        let temp = TempDir::new().unwrap();
        let repo = repo();
        let mut active = List::new("Active", 0);
        active.add_item(Listitem::new("Kept", 0));
        active.add_item(Listitem::new("Gone", 1));
        active.add_item(Listitem::new("Also gone", 2));
        let active_id = repo.store_list(&mut active, false).await.unwrap().unwrap();
        let gone: Vec<i64> = active.items()[1..]
            .iter()
            .filter_map(|i| i.id().as_persisted())
            .collect();
        repo.move_listitems_to_trash(active_id, &gone, false).await.unwrap();

        let mut trashed = List::new("Old", 1);
        trashed.add_item(Listitem::new("Thing", 0));
        let trashed_id = repo.store_list(&mut trashed, false).await.unwrap().unwrap();
        repo.move_lists_to_trash(&[trashed_id]).await.unwrap();

        let mut exporter = Exporter::new(repo, temp.path(), temp.path());
        exporter.initialize().unwrap();
        let mut listener = ProgressListener::new();
        assert_eq!(exporter.export_trash(&mut listener).await.unwrap(), 2);
        assert_eq!(listener.total(), 4);

        let work = exporter.work_dir();
        let list = read_json(&work.join(TRASH_DIR).join(format!("{trashed_id}-Old.json")));
        assert!(list["deleted"].is_i64());
        assert_eq!(list["items"][0]["item"], "Thing");

        let group = read_json(&work.join(TRASH_ITEMS_DIR).join(format!("{active_id}.json")));
        assert_eq!(group["id"], active_id);
        assert_eq!(group["created"], active.created());
        let names: Vec<_> = group["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["item"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Gone", "Also gone"]);
    }

    #[tokio::test]
    async fn test_finalize_copies_with_suffix() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("lists-export.zip"), b"older export").unwrap();

        let mut prefs = JsonPreferences::memory();
        prefs.set(PrefKey::AppLanguage, json!("en")).unwrap();

        let mut exporter = Exporter::new(repo(), &temp.path().join("cache"), &docs);
        exporter.initialize().unwrap();
        let mut listener = ProgressListener::new();
        assert_eq!(exporter.export_settings(&prefs, &mut listener).unwrap(), 1);

        let archive = exporter.finalize().unwrap();
        assert_eq!(exporter.state(), ExportState::Done);
        assert_ne!(archive, docs.join("lists-export.zip"));
        assert!(archive.starts_with(&docs));
        assert_eq!(fs::read(docs.join("lists-export.zip")).unwrap(), b"older export");
        assert!(!exporter.work_dir().exists());
        assert!(!exporter.cache_archive().exists());
        assert!(fs::metadata(&archive).unwrap().len() > 0);

        exporter.clean_up(true).unwrap();
        assert!(!archive.exists());
        assert!(!exporter.cache_archive().exists());
        exporter.clean_up(true).unwrap();
    }

    #[tokio::test]
    async fn test_stop_handle_stops_loops() {
        let temp = TempDir::new().unwrap();
        let repo = repo();
        for name in ["A", "B"] {
            repo.store_list(&mut List::new(name, 0), false).await.unwrap();
        }
        let mut exporter = Exporter::new(repo, temp.path(), temp.path());
        exporter.initialize().unwrap();
        exporter.stop_handle().stop();

        let mut listener = ProgressListener::new();
        assert!(exporter.export_lists(&mut listener).await.is_err());
        assert_eq!(exporter.state(), ExportState::Stopped);

        exporter.stop().unwrap();
        exporter.stop().unwrap();
        assert!(!exporter.work_dir().exists());

        exporter.initialize().unwrap();
        assert_eq!(exporter.state(), ExportState::Running);
    }
}
