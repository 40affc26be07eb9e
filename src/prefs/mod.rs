//! Application preferences and the collaborators they drive.
//!
//! The storage core only touches preferences through the [`Preferences`]
//! trait, keyed by the closed [`PrefKey`] set. Side effects of a changed
//! preference (toggling the watch integration, switching the language,
//! changing log verbosity) go through the narrow collaborator traits
//! defined here; the settings importer calls them explicitly once the
//! import is done.

mod json;

pub use json::{JsonPreferences, PrefChange};

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Every preference the app knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrefKey {
    FirstStart,
    LastVersion,
    GarminConnectIQ,
    AppLanguage,
    LogMode,
    LogsAutoDelete,
    Animations,
    AlwaysTransmitTo,
    ConfirmDeleteList,
    ConfirmDeleteListitem,
    ConfirmEmptyList,
    ConfirmTransmitList,
    ConfirmEraseList,
    ConfirmEraseListitem,
    ConfirmEmptyTrash,
    ConfirmRestoreList,
    ConfirmRestoreListitem,
    TrashLists,
    TrashListitems,
    TrashKeepinStock,
    OpenAppOnTransmit,
    DeleteListOnDevice,
    SyncListOnDevice,
    AddMoreItemsDialog,
    DebugSimulator,
    DebugApp,
    OpenedList,
    IgnoreWatchOutdated,
    AdmobBannerHeight,
}

impl PrefKey {
    pub const ALL: [Self; 29] = [
        Self::FirstStart,
        Self::LastVersion,
        Self::GarminConnectIQ,
        Self::AppLanguage,
        Self::LogMode,
        Self::LogsAutoDelete,
        Self::Animations,
        Self::AlwaysTransmitTo,
        Self::ConfirmDeleteList,
        Self::ConfirmDeleteListitem,
        Self::ConfirmEmptyList,
        Self::ConfirmTransmitList,
        Self::ConfirmEraseList,
        Self::ConfirmEraseListitem,
        Self::ConfirmEmptyTrash,
        Self::ConfirmRestoreList,
        Self::ConfirmRestoreListitem,
        Self::TrashLists,
        Self::TrashListitems,
        Self::TrashKeepinStock,
        Self::OpenAppOnTransmit,
        Self::DeleteListOnDevice,
        Self::SyncListOnDevice,
        Self::AddMoreItemsDialog,
        Self::DebugSimulator,
        Self::DebugApp,
        Self::OpenedList,
        Self::IgnoreWatchOutdated,
        Self::AdmobBannerHeight,
    ];

    /// Name used in `settings.json` archives.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FirstStart => "FirstStart",
            Self::LastVersion => "LastVersion",
            Self::GarminConnectIQ => "GarminConnectIQ",
            Self::AppLanguage => "AppLanguage",
            Self::LogMode => "LogMode",
            Self::LogsAutoDelete => "LogsAutoDelete",
            Self::Animations => "Animations",
            Self::AlwaysTransmitTo => "AlwaysTransmitTo",
            Self::ConfirmDeleteList => "ConfirmDeleteList",
            Self::ConfirmDeleteListitem => "ConfirmDeleteListitem",
            Self::ConfirmEmptyList => "ConfirmEmptyList",
            Self::ConfirmTransmitList => "ConfirmTransmitList",
            Self::ConfirmEraseList => "ConfirmEraseList",
            Self::ConfirmEraseListitem => "ConfirmEraseListitem",
            Self::ConfirmEmptyTrash => "ConfirmEmptyTrash",
            Self::ConfirmRestoreList => "ConfirmRestoreList",
            Self::ConfirmRestoreListitem => "ConfirmRestoreListitem",
            Self::TrashLists => "TrashLists",
            Self::TrashListitems => "TrashListitems",
            Self::TrashKeepinStock => "TrashKeepinStock",
            Self::OpenAppOnTransmit => "OpenAppOnTransmit",
            Self::DeleteListOnDevice => "DeleteListOnDevice",
            Self::SyncListOnDevice => "SyncListOnDevice",
            Self::AddMoreItemsDialog => "AddMoreItemsDialog",
            Self::DebugSimulator => "DebugSimulator",
            Self::DebugApp => "DebugApp",
            Self::OpenedList => "OpenedList",
            Self::IgnoreWatchOutdated => "IgnoreWatchOutdated",
            Self::AdmobBannerHeight => "AdmobBannerHeight",
        }
    }

    /// Key in the backing key/value store.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            // stored with a capital I since the first release
            Self::TrashKeepinStock => "LISTAGO_TrashKeepInStock".to_string(),
            other => format!("LISTAGO_{}", other.name()),
        }
    }

    /// Keys that describe one installation rather than user choices.
    /// They are never taken over from an imported archive.
    #[must_use]
    pub const fn is_device_local(&self) -> bool {
        matches!(
            self,
            Self::FirstStart
                | Self::LastVersion
                | Self::DebugSimulator
                | Self::DebugApp
                | Self::OpenedList
        )
    }
}

impl fmt::Display for PrefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PrefKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown preference '{s}'")))
    }
}

/// Key/value preference store.
///
/// Values are arbitrary JSON. Setting `null` removes the key.
pub trait Preferences {
    fn get(&self, key: PrefKey) -> Option<Value>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn set(&mut self, key: PrefKey, value: Value) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    fn remove(&mut self, key: PrefKey) -> Result<()>;

    /// Every stored preference, keyed by [`PrefKey::name`].
    fn export(&self) -> Map<String, Value> {
        PrefKey::ALL
            .into_iter()
            .filter_map(|key| self.get(key).map(|v| (key.name().to_string(), v)))
            .collect()
    }

    fn get_bool(&self, key: PrefKey, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn get_u64(&self, key: PrefKey) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }
}

/// Remote-device (watch) integration.
pub trait DeviceIntegration {
    fn initialized(&self) -> bool;

    /// # Errors
    ///
    /// Returns an error if the integration cannot be started.
    fn initialize(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the integration cannot be stopped.
    fn shutdown(&mut self) -> Result<()>;
}

/// Active UI language.
pub trait LanguageService {
    /// # Errors
    ///
    /// Returns an error if the language is not available.
    fn change_language(&mut self, locale: &str) -> Result<()>;
}

/// Application log output.
pub trait LogSink {
    fn set_level(&mut self, level: &str);

    /// Days log files are kept; `None` keeps them forever.
    fn set_retention_days(&mut self, days: Option<u64>);
}
