//! Archive export and import.
//!
//! An archive is a zip (or plain directory) with this layout:
//!
//! ```text
//! lists/lists/<id>-<name>.json     one file per active list
//! lists/trash/<id>-<name>.json     one file per trashed list
//! lists/trash/items/<listId>.json  trashed items of one list
//! settings.json                    flat {name: value} preferences
//! ```
//!
//! # Submodules
//!
//! - [`types`] - JSON models of the archive files
//! - [`revision`] - `rev` dispatch and identity resolution
//! - [`progress`] - Per-step progress counters
//! - [`file`] - Atomic writes, filenames, zip helpers
//! - [`export`] - Exporter state machine
//! - [`import`] - Importer state machine
//! - [`settings`] - Settings import and reconciliation

pub mod export;
pub mod file;
pub mod import;
pub mod progress;
pub mod revision;
pub mod settings;
pub mod types;

pub use export::{ExportState, Exporter, StopHandle};
pub use import::{ImportState, Importer};
pub use progress::ProgressListener;
pub use revision::{ListRevision, ListitemRevision, Revision, Translator};
pub use settings::{SettingsEffects, SettingsReport};
pub use types::{ContentClass, ListModel, ListitemModel, TrashGroupModel};
