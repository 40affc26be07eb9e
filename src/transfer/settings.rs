//! Import of `settings.json` into the preferences store.
//!
//! Keys are applied first. Side effects of the applied keys (the watch
//! integration, the UI language, log verbosity and retention) run
//! afterwards in one reconciliation pass, for the keys that changed.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::prefs::{DeviceIntegration, LanguageService, LogSink, PrefKey, Preferences};
use crate::transfer::progress::ProgressListener;

/// Collaborators driven by imported preferences. Missing ones are skipped.
#[derive(Default)]
pub struct SettingsEffects<'a> {
    pub device: Option<&'a mut dyn DeviceIntegration>,
    pub language: Option<&'a mut dyn LanguageService>,
    pub logs: Option<&'a mut dyn LogSink>,
}

impl fmt::Debug for SettingsEffects<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsEffects")
            .field("device", &self.device.is_some())
            .field("language", &self.language.is_some())
            .field("logs", &self.logs.is_some())
            .finish()
    }
}

/// Outcome of a settings import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsReport {
    /// Keys written to the store.
    pub applied: Vec<String>,
    /// Keys whose value actually changed.
    pub changed: Vec<String>,
    /// Device-local keys left alone.
    pub ignored: Vec<String>,
    /// Keys this version does not know.
    pub unknown: Vec<String>,
}

/// Apply the preferences in the settings file at `path`.
///
/// Device-local keys are ignored, unknown keys are counted failed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON object.
pub fn import_settings(
    path: &Path,
    prefs: &mut dyn Preferences,
    effects: SettingsEffects<'_>,
    listener: &mut ProgressListener,
) -> Result<SettingsReport> {
    let content = std::fs::read_to_string(path)?;
    let Value::Object(settings) = serde_json::from_str::<Value>(&content)? else {
        return Err(Error::InvalidArchive {
            path: path.to_path_buf(),
            reason: "settings are not a JSON object".to_string(),
        });
    };

    let mut report = SettingsReport::default();
    let changed = apply(settings, prefs, listener, &mut report);
    reconcile(&changed, &*prefs, effects);
    report.changed = changed.iter().map(|k| k.name().to_string()).collect();

    info!(
        applied = report.applied.len(),
        changed = report.changed.len(),
        ignored = report.ignored.len(),
        unknown = report.unknown.len(),
        "Imported settings"
    );
    Ok(report)
}

fn apply(
    settings: Map<String, Value>,
    prefs: &mut dyn Preferences,
    listener: &mut ProgressListener,
    report: &mut SettingsReport,
) -> Vec<PrefKey> {
    listener.init(settings.len());
    let mut changed = Vec::new();

    for (name, value) in settings {
        let key = match name.parse::<PrefKey>() {
            Ok(key) => key,
            Err(_) => {
                warn!(key = %name, "Unknown preference in settings");
                report.unknown.push(name);
                listener.one_failed(1);
                listener.one_done(1);
                continue;
            }
        };
        if key.is_device_local() {
            debug!(%key, "Ignoring device-local preference");
            report.ignored.push(name);
            listener.one_done(1);
            continue;
        }

        let before = prefs.get(key);
        match prefs.set(key, value.clone()) {
            Ok(()) => {
                let after = (!value.is_null()).then_some(value);
                if before != after {
                    changed.push(key);
                }
                report.applied.push(name);
                listener.one_success(1);
            }
            Err(e) => {
                warn!(%key, error = %e, "Could not apply preference");
                listener.one_failed(1);
            }
        }
        listener.one_done(1);
    }
    changed
}

/// Bring the collaborators in line with the preferences in `changed`.
fn reconcile(changed: &[PrefKey], prefs: &dyn Preferences, mut effects: SettingsEffects<'_>) {
    for key in changed {
        match key {
            PrefKey::GarminConnectIQ => {
                let Some(device) = effects.device.as_deref_mut() else {
                    continue;
                };
                let enabled = prefs.get_bool(*key, false);
                let result = match (enabled, device.initialized()) {
                    (true, false) => device.initialize(),
                    (false, true) => device.shutdown(),
                    _ => Ok(()),
                };
                if let Err(e) = result {
                    warn!(enabled, error = %e, "Could not switch device integration");
                }
            }
            PrefKey::AppLanguage => {
                let Some(language) = effects.language.as_deref_mut() else {
                    continue;
                };
                if let Some(locale) = prefs.get(*key).as_ref().and_then(Value::as_str) {
                    if let Err(e) = language.change_language(locale) {
                        warn!(locale, error = %e, "Could not change language");
                    }
                }
            }
            PrefKey::LogMode => {
                if let Some(logs) = effects.logs.as_deref_mut() {
                    match prefs.get(*key) {
                        Some(Value::String(level)) => logs.set_level(&level),
                        Some(other) => logs.set_level(&other.to_string()),
                        None => {}
                    }
                }
            }
            PrefKey::LogsAutoDelete => {
                if let Some(logs) = effects.logs.as_deref_mut() {
                    // 0 keeps logs forever
                    let days = prefs.get_u64(*key).filter(|d| *d > 0);
                    logs.set_retention_days(days);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::JsonPreferences;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDevice {
        on: bool,
        calls: Vec<&'static str>,
    }

    impl DeviceIntegration for FakeDevice {
        fn initialized(&self) -> bool {
            self.on
        }

        fn initialize(&mut self) -> Result<()> {
            self.on = true;
            self.calls.push("initialize");
            Ok(())
        }

        fn shutdown(&mut self) -> Result<()> {
            self.on = false;
            self.calls.push("shutdown");
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLanguage(Vec<String>);

    impl LanguageService for FakeLanguage {
        fn change_language(&mut self, locale: &str) -> Result<()> {
            self.0.push(locale.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLogs {
        level: Option<String>,
        retention: Option<Option<u64>>,
    }

    impl LogSink for FakeLogs {
        fn set_level(&mut self, level: &str) {
            self.level = Some(level.to_string());
        }

        fn set_retention_days(&mut self, days: Option<u64>) {
            self.retention = Some(days);
        }
    }

    fn write_settings(temp: &TempDir, value: &Value) -> std::path::PathBuf {
        let path = temp.path().join("settings.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_filters_and_counts() {
        let temp = TempDir::new().unwrap();
        let path = write_settings(
            &temp,
            &json!({
                "FirstStart": false,
                "OpenedList": 3,
                "Animations": false,
                "TrashKeepinStock": 7,
                "NotAPreference": 1
            }),
        );
        let mut prefs = JsonPreferences::memory();
        let mut listener = ProgressListener::new();
        let report =
            import_settings(&path, &mut prefs, SettingsEffects::default(), &mut listener).unwrap();

        assert_eq!(listener.total(), 5);
        assert_eq!(listener.done(), 5);
        assert_eq!(listener.success(), 2);
        assert_eq!(listener.failed(), 1);
        assert_eq!(report.ignored, vec!["FirstStart", "OpenedList"]);
        assert_eq!(report.unknown, vec!["NotAPreference"]);
        assert!(prefs.get(PrefKey::FirstStart).is_none());
        assert_eq!(prefs.get_u64(PrefKey::TrashKeepinStock), Some(7));
    }

    #[test]
    fn test_reconciles_changed_keys_once() {
        let temp = TempDir::new().unwrap();
        let path = write_settings(
            &temp,
            &json!({
                "GarminConnectIQ": true,
                "AppLanguage": "de",
                "LogMode": "debug",
                "LogsAutoDelete": 0
            }),
        );
        let mut prefs = JsonPreferences::memory();
        prefs.set(PrefKey::LogMode, json!("debug")).unwrap();

        let mut device = FakeDevice::default();
        let mut language = FakeLanguage::default();
        let mut logs = FakeLogs::default();
        let mut rx = prefs.subscribe();
        let report = import_settings(
            &path,
            &mut prefs,
            SettingsEffects {
                device: Some(&mut device),
                language: Some(&mut language),
                logs: Some(&mut logs),
            },
            &mut ProgressListener::new(),
        )
        .unwrap();

        assert_eq!(device.calls, vec!["initialize"]);
        assert_eq!(language.0, vec!["de"]);
        assert_eq!(logs.level, None, "unchanged log mode is not reapplied");
        assert_eq!(logs.retention, Some(None));
        assert!(!report.changed.contains(&"LogMode".to_string()));
        assert!(rx.try_recv().is_ok(), "the store still announces its own changes");
    }

    #[test]
    fn test_rejects_non_object() {
        let temp = TempDir::new().unwrap();
        let path = write_settings(&temp, &json!([1, 2, 3]));
        let mut prefs = JsonPreferences::memory();
        let result = import_settings(
            &path,
            &mut prefs,
            SettingsEffects::default(),
            &mut ProgressListener::new(),
        );
        assert!(matches!(result, Err(Error::InvalidArchive { .. })));
    }
}
