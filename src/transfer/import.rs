//! Import of an export archive into the store.
//!
//! The importer accepts a zip archive or an already unpacked directory.
//! [`Importer::analyse`] reports which content classes are present; each
//! class is then imported on its own. Failures of single files are counted
//! in the [`ProgressListener`] and logged, the remaining files still go in.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::prefs::Preferences;
use crate::storage::ListsRepository;
use crate::transfer::file::{has_json_content, json_files, remove_dir_if_exists, unzip};
use crate::transfer::progress::ProgressListener;
use crate::transfer::revision::{ListRevision, ListitemRevision, Translator};
use crate::transfer::settings::{SettingsEffects, SettingsReport, import_settings};
use crate::transfer::types::{
    ContentClass, LISTS_DIR, SETTINGS_FILE, TRASH_DIR, TRASH_ITEMS_DIR, TrashGroupModel,
};

/// Lifecycle of an [`Importer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Created,
    Initialized,
    Analysed,
    Importing,
    Done,
    Failed,
}

impl ImportState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Analysed => "analysed",
            Self::Importing => "importing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads an export archive into a [`ListsRepository`].
#[derive(Debug)]
pub struct Importer {
    repo: ListsRepository,
    import_dir: PathBuf,
    state: ImportState,
    root: Option<PathBuf>,
    scratch: Option<PathBuf>,
    /// Archived list id to stored list id, for lists imported by this
    /// importer. Trash groups find their owner here first.
    session: HashMap<i64, i64>,
}

impl Importer {
    /// Importer unpacking archives below `<cache_dir>/import`.
    #[must_use]
    pub fn new(repo: ListsRepository, cache_dir: &Path) -> Self {
        Self {
            repo,
            import_dir: cache_dir.join("import"),
            state: ImportState::Created,
            root: None,
            scratch: None,
            session: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ImportState {
        self.state
    }

    /// Root of the unpacked archive once initialized.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Open `source`, a zip archive or an unpacked archive directory.
    ///
    /// Archives are unpacked into a fresh directory below the cache. When
    /// the unpacked tree holds nothing but one directory, that directory
    /// is taken as the archive root.
    ///
    /// # Errors
    ///
    /// Returns an error if the importer was already initialized, or if
    /// `source` does not exist or cannot be unpacked.
    pub fn initialize(&mut self, source: &Path) -> Result<()> {
        if self.state != ImportState::Created {
            return Err(self.wrong_state("created"));
        }
        match self.open(source) {
            Ok(root) => {
                info!(source = %source.display(), root = %root.display(), "Import initialized");
                self.root = Some(root);
                self.state = ImportState::Initialized;
                Ok(())
            }
            Err(e) => {
                error!(source = %source.display(), error = %e, "Could not open import");
                self.state = ImportState::Failed;
                Err(e)
            }
        }
    }

    /// Content classes present in the archive.
    ///
    /// A directory class counts only if it holds at least one non-empty
    /// JSON file somewhere below it. An empty result means the archive is
    /// unusable; the importer is failed then.
    ///
    /// # Errors
    ///
    /// Returns an error if the importer was not initialized.
    pub fn analyse(&mut self) -> Result<Vec<ContentClass>> {
        if !matches!(self.state, ImportState::Initialized | ImportState::Analysed) {
            return Err(self.wrong_state("initialized"));
        }
        let root = self.root_dir()?;
        let content: Vec<ContentClass> = ContentClass::ALL
            .into_iter()
            .filter(|class| {
                let path = root.join(class.relative_path());
                match class {
                    ContentClass::Settings => fs::metadata(&path).is_ok_and(|m| m.is_file() && m.len() > 0),
                    ContentClass::Lists | ContentClass::Trash => has_json_content(&path),
                }
            })
            .collect();

        if content.is_empty() {
            warn!(root = %root.display(), "Archive contains nothing to import");
            self.state = ImportState::Failed;
        } else {
            debug!(content = ?content, "Analysed archive");
            self.state = ImportState::Analysed;
        }
        Ok(content)
    }

    /// Import every list file of `lists/lists/` as an active list.
    ///
    /// Returns the number of lists stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive was not analysed or the list
    /// directory cannot be read.
    pub async fn import_lists(&mut self, listener: &mut ProgressListener) -> Result<usize> {
        self.begin()?;
        let dir = self.root_dir()?.join(LISTS_DIR);
        let files = self.guard(json_files(&dir).map_err(Error::from))?;
        listener.init(files.len());

        let stored = self.import_list_files(&files, false, listener).await;
        info!(stored, failed = listener.failed(), "Imported lists");
        Ok(stored)
    }

    /// Import trashed lists from `lists/trash/` and trashed items from
    /// `lists/trash/items/`, keeping their deletion times.
    ///
    /// Returns the number of files imported.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive was not analysed or the trash
    /// directories cannot be read.
    pub async fn import_trash(&mut self, listener: &mut ProgressListener) -> Result<usize> {
        self.begin()?;
        let root = self.root_dir()?;
        let list_files = self.guard(json_files(&root.join(TRASH_DIR)).map_err(Error::from))?;
        let group_files = self.guard(json_files(&root.join(TRASH_ITEMS_DIR)).map_err(Error::from))?;
        listener.init(list_files.len() + group_files.len());

        let mut imported = self.import_list_files(&list_files, true, listener).await;
        let translator = Translator::new(&self.repo, true);
        for path in &group_files {
            match import_trash_group(&translator, &self.session, path).await {
                Ok(items) => {
                    debug!(path = %path.display(), items, "Imported trashed listitems");
                    imported += 1;
                    listener.one_success(1);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not import trashed listitems");
                    listener.one_failed(1);
                }
            }
            listener.one_done(1);
        }
        info!(imported, failed = listener.failed(), "Imported trash");
        Ok(imported)
    }

    /// Apply `settings.json` to `prefs` and drive the collaborators in
    /// `effects` for the preferences that changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive was not analysed or the settings
    /// file cannot be read.
    pub fn import_settings(
        &mut self,
        prefs: &mut dyn Preferences,
        effects: SettingsEffects<'_>,
        listener: &mut ProgressListener,
    ) -> Result<SettingsReport> {
        self.begin()?;
        let path = self.root_dir()?.join(SETTINGS_FILE);
        import_settings(&path, prefs, effects, listener)
    }

    /// Mark the import complete.
    ///
    /// # Errors
    ///
    /// Returns an error unless at least one import step ran.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != ImportState::Importing {
            return Err(self.wrong_state("importing"));
        }
        self.state = ImportState::Done;
        info!(lists = self.session.len(), "Import finished");
        Ok(())
    }

    /// Remove the directory an archive was unpacked into. A directory
    /// passed to [`initialize`](Self::initialize) is never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be removed.
    pub fn clean_up(&mut self) -> Result<()> {
        if let Some(scratch) = self.scratch.take() {
            remove_dir_if_exists(&scratch)?;
            debug!(dir = %scratch.display(), "Removed import scratch directory");
        }
        Ok(())
    }

    fn open(&mut self, source: &Path) -> Result<PathBuf> {
        if source.is_dir() {
            return Ok(source.to_path_buf());
        }
        if !source.is_file() {
            return Err(Error::InvalidArchive {
                path: source.to_path_buf(),
                reason: "no such file or directory".to_string(),
            });
        }

        let scratch = self.import_dir.join(uuid::Uuid::new_v4().to_string());
        self.scratch = Some(scratch.clone());
        unzip(source, &scratch)?;
        Ok(single_child_dir(&scratch)?.unwrap_or(scratch))
    }

    async fn import_list_files(
        &mut self,
        files: &[PathBuf],
        trash: bool,
        listener: &mut ProgressListener,
    ) -> usize {
        let translator = Translator::new(&self.repo, trash);
        let mut stored = 0;
        for path in files {
            match import_list_file(&translator, path).await {
                Ok(Some((archived, id))) => {
                    if let Some(archived) = archived {
                        self.session.insert(archived, id);
                    }
                    stored += 1;
                    listener.one_success(1);
                }
                Ok(None) => listener.one_failed(1),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not import list");
                    listener.one_failed(1);
                }
            }
            listener.one_done(1);
        }
        stored
    }

    fn begin(&mut self) -> Result<()> {
        if !matches!(self.state, ImportState::Analysed | ImportState::Importing) {
            return Err(self.wrong_state("analysed"));
        }
        self.state = ImportState::Importing;
        Ok(())
    }

    /// Fail the importer when `result` is an error.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| {
            error!(error = %e, "Import failed");
            self.state = ImportState::Failed;
        })
    }

    fn root_dir(&self) -> Result<PathBuf> {
        self.root.clone().ok_or_else(|| self.wrong_state("initialized"))
    }

    fn wrong_state(&self, expected: &'static str) -> Error {
        Error::InvalidState {
            expected,
            actual: self.state.to_string(),
        }
    }
}

/// Store one list file. Returns the archived id (if the file had one) and
/// the stored id, or `None` when the file describes no list.
async fn import_list_file(
    translator: &Translator<'_>,
    path: &Path,
) -> Result<Option<(Option<i64>, i64)>> {
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let archived = value.get("id").and_then(Value::as_i64);
    let Some(mut list) = translator.list(ListRevision::parse(value)?).await? else {
        return Ok(None);
    };
    let id = translator
        .repository()
        .store_list(&mut list, true)
        .await?
        .ok_or_else(|| Error::Other(format!("list {} was not stored", list.to_log())))?;
    debug!(list = %list.to_log(), items = list.items().len(), "Imported list");
    Ok(Some((archived, id)))
}

/// Store one group of trashed items. Returns the number of items stored.
async fn import_trash_group(
    translator: &Translator<'_>,
    session: &HashMap<i64, i64>,
    path: &Path,
) -> Result<usize> {
    let group: TrashGroupModel = serde_json::from_str(&fs::read_to_string(path)?)?;

    let owner = match group.id.and_then(|id| session.get(&id).copied()) {
        Some(id) => Some(id),
        None => {
            translator
                .find_list(group.uuid.as_ref(), group.id, group.created)
                .await?
        }
    };
    let Some(list_id) = owner else {
        return Err(Error::InvalidArchive {
            path: path.to_path_buf(),
            reason: format!("no list found for trashed items of list {:?}", group.id),
        });
    };

    let mut items = Vec::with_capacity(group.items.len());
    for value in group.items {
        let item = match ListitemRevision::parse(value) {
            Ok(revision) => translator.listitem(Some(list_id), revision, true).await?,
            Err(e) => {
                warn!(list_id, error = %e, "Skipping unreadable trashed listitem");
                None
            }
        };
        items.extend(item);
    }
    translator.repository().store_trashed_listitems(list_id, &mut items).await
}

/// The only entry of `dir`, if that entry is a directory.
fn single_child_dir(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(None);
    }
    let entry = entries.remove(0);
    Ok(entry.file_type()?.is_dir().then(|| entry.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{List, Listitem};
    use crate::storage::{ConnectionGuard, ListsQuery};
    use crate::transfer::file::{atomic_write, zip_dir};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn repo() -> ListsRepository {
        ListsRepository::new(Arc::new(ConnectionGuard::memory()))
    }

    fn write(root: &Path, rel: &str, value: &Value) {
        atomic_write(&root.join(rel), &value.to_string()).unwrap();
    }

    fn groceries_archive(root: &Path) {
        write(
            root,
            "lists/lists/7-Groceries.json",
            &json!({
                "id": 7,
                "name": "Groceries",
                "order": 0,
                "created": 1000,
                "updated": 1000,
                "items": [
                    {"id": 1, "item": "Bread", "order": 0, "created": 1001, "rev": 1},
                    {"id": 2, "item": "Milk", "order": 1, "created": 1002, "locked": true, "rev": 1}
                ],
                "rev": 1
            }),
        );
    }

    #[tokio::test]
    async fn test_state_machine() {
        let temp = TempDir::new().unwrap();
        let mut importer = Importer::new(repo(), temp.path());
        let mut listener = ProgressListener::new();

        assert!(importer.analyse().is_err());
        assert!(importer.import_lists(&mut listener).await.is_err());

        importer.initialize(&temp.path().join("missing.zip")).unwrap_err();
        assert_eq!(importer.state(), ImportState::Failed);
    }

    #[tokio::test]
    async fn test_analyse_empty_directory_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("archive");
        fs::create_dir_all(archive.join("lists").join("lists")).unwrap();
        fs::write(archive.join("lists/lists/empty.json"), b"").unwrap();

        let mut importer = Importer::new(repo(), temp.path());
        importer.initialize(&archive).unwrap();
        assert!(importer.analyse().unwrap().is_empty());
        assert_eq!(importer.state(), ImportState::Failed);
    }

    #[tokio::test]
    async fn test_import_directory_and_reimport() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("archive");
        groceries_archive(&archive);
        write(&archive, "lists/lists/2-Broken.json", &json!({"name": "Broken", "rev": 9}));
        let repo = repo();

        for _ in 0..2 {
            let mut importer = Importer::new(repo.clone(), temp.path());
            importer.initialize(&archive).unwrap();
            assert_eq!(importer.analyse().unwrap(), vec![ContentClass::Lists]);

            let mut listener = ProgressListener::new();
            assert_eq!(importer.import_lists(&mut listener).await.unwrap(), 1);
            assert_eq!((listener.success(), listener.failed()), (1, 1));
            importer.finish().unwrap();
            importer.clean_up().unwrap();
        }

        assert!(archive.exists(), "caller's directory is kept");
        assert_eq!(repo.query_lists_count(false).await.unwrap(), 1);
        let lists = repo
            .query_lists(ListsQuery {
                peek: false,
                ..ListsQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(lists[0].items().len(), 2);
        assert!(lists[0].items()[1].locked());
    }

    #[tokio::test]
    async fn test_zip_with_wrapping_directory() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        groceries_archive(&src.join("backup"));
        let zip = temp.path().join("backup.zip");
        zip_dir(&src, &zip).unwrap();

        let cache = temp.path().join("cache");
        let mut importer = Importer::new(repo(), &cache);
        importer.initialize(&zip).unwrap();
        assert!(importer.root().unwrap().ends_with("backup"));
        assert_eq!(importer.analyse().unwrap(), vec![ContentClass::Lists]);

        importer.clean_up().unwrap();
        assert_eq!(fs::read_dir(cache.join("import")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_trash_groups_find_their_owner() {
        let temp = TempDir::new().unwrap();
        let repo = repo();
        let mut existing = List::new("Pantry", 0);
        existing.add_item(Listitem::new("Rice", 0));
        let pantry_id = repo.store_list(&mut existing, false).await.unwrap().unwrap();

        let archive = temp.path().join("archive");
        groceries_archive(&archive);
        write(
            &archive,
            "lists/trash/items/7.json",
            &json!({"id": 7, "created": 1000, "items": [{"id": 3, "item": "Butter", "created": 1003, "deleted": 5000}]}),
        );
        write(
            &archive,
            &format!("lists/trash/items/{pantry_id}.json"),
            &json!({"id": pantry_id, "created": existing.created(), "items": [{"item": "Flour"}]}),
        );
        write(
            &archive,
            "lists/trash/items/99.json",
            &json!({"id": 99, "created": 1, "items": [{"item": "Lost"}]}),
        );

        let mut importer = Importer::new(repo.clone(), temp.path());
        importer.initialize(&archive).unwrap();
        assert_eq!(
            importer.analyse().unwrap(),
            vec![ContentClass::Lists, ContentClass::Trash]
        );
        let mut listener = ProgressListener::new();
        importer.import_lists(&mut listener).await.unwrap();
        assert_eq!(importer.import_trash(&mut listener).await.unwrap(), 2);
        assert_eq!(listener.failed(), 1);

        let trashed = repo.query_trashed_listitems().await.unwrap();
        let butter = trashed.iter().find(|i| i.item() == "Butter").unwrap();
        assert_eq!(butter.deleted(), Some(5000));
        assert_ne!(butter.list_id(), Some(pantry_id));
        let flour = trashed.iter().find(|i| i.item() == "Flour").unwrap();
        assert_eq!(flour.list_id(), Some(pantry_id));
    }
}
