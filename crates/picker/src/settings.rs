use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use roster_directory::ParticipantSource;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "roster";
pub const SETTINGS_FILE_NAME: &str = "picker.json";
/// Rank given to directory categories the picker does not know; sorts after every known one.
pub const DEFAULT_UNKNOWN_SOURCE_PRIORITY: u8 = 3;

/// Sort rank per directory category, lower first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePriorities {
    #[serde(default)]
    pub users: u8,
    #[serde(default)]
    pub circles: u8,
    #[serde(default = "default_groups_priority")]
    pub groups: u8,
    #[serde(default = "default_emails_priority")]
    pub emails: u8,
}

impl Default for SourcePriorities {
    fn default() -> Self {
        Self {
            users: 0,
            circles: 0,
            groups: default_groups_priority(),
            emails: default_emails_priority(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerSettings {
    #[serde(default)]
    pub source_priorities: SourcePriorities,
    #[serde(default = "default_unknown_source_priority")]
    pub unknown_source_priority: u8,
    /// Abort the in-flight fetch when a newer one starts. When off, superseded fetches still
    /// run to completion and their results are discarded by ticket.
    #[serde(default = "default_abort_superseded_fetches")]
    pub abort_superseded_fetches: bool,
    #[serde(default)]
    pub trim_search_query: bool,
}

impl Default for PickerSettings {
    fn default() -> Self {
        Self {
            source_priorities: SourcePriorities::default(),
            unknown_source_priority: default_unknown_source_priority(),
            abort_superseded_fetches: default_abort_superseded_fetches(),
            trim_search_query: false,
        }
    }
}

impl PickerSettings {
    pub fn priority_of(&self, source: &ParticipantSource) -> u8 {
        match source {
            ParticipantSource::Users => self.source_priorities.users,
            ParticipantSource::Circles => self.source_priorities.circles,
            ParticipantSource::Groups => self.source_priorities.groups,
            ParticipantSource::Emails => self.source_priorities.emails,
            ParticipantSource::Other(_) => self.unknown_source_priority,
        }
    }

    /// Applies query normalization before the query is compared with the stored one.
    pub fn normalize_query(&self, query: Option<String>) -> Option<String> {
        if !self.trim_search_query {
            return query;
        }

        query
            .map(|query| query.trim().to_string())
            .filter(|query| !query.is_empty())
    }
}

pub struct SettingsStore {
    settings: ArcSwap<PickerSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".roster"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self::with_settings(config_path, settings)
    }

    /// Builds a store around known settings without touching disk.
    pub fn with_settings(config_path: PathBuf, settings: PickerSettings) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<PickerSettings> {
        self.settings.load_full()
    }

    /// Stores and persists `settings`. Returns false when they equal the current value, in
    /// which case the file is left untouched.
    pub fn update(&self, settings: PickerSettings) -> SettingsResult<bool> {
        if *self.settings.load_full() == settings {
            return Ok(false);
        }

        self.write_atomically(&settings)?;
        self.settings.store(Arc::new(settings));
        Ok(true)
    }

    fn load_from_disk(path: &Path) -> PickerSettings {
        if !path.exists() {
            tracing::info!("picker settings not found at {:?}, using defaults", path);
            return PickerSettings::default();
        }

        let figment = Figment::from(Serialized::defaults(PickerSettings::default()))
            .merge(Json::file(path));

        match figment.extract::<PickerSettings>() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to parse picker settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                PickerSettings::default()
            }
        }
    }

    fn write_atomically(&self, settings: &PickerSettings) -> SettingsResult<()> {
        let path = self.config_path.as_path();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(CreateSettingsDirSnafu {
                stage: "settings-create-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let mut encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "settings-encode",
        })?;
        encoded.push(b'\n');

        let partial = path.with_extension("json.partial");
        std::fs::write(&partial, &encoded).context(WriteSettingsSnafu {
            stage: "settings-write-partial",
            path: partial.clone(),
        })?;
        std::fs::rename(&partial, path).context(ReplaceSettingsSnafu {
            stage: "settings-replace",
            path: path.to_path_buf(),
        })?;

        tracing::info!(
            path = %path.display(),
            unknown_source_priority = settings.unknown_source_priority,
            abort_superseded_fetches = settings.abort_superseded_fetches,
            "picker settings saved"
        );
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::with_settings(Self::default_config_path(), PickerSettings::default())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("picker settings directory {path:?} could not be created on `{stage}`"))]
    CreateSettingsDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("picker settings could not be encoded on `{stage}`"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("picker settings could not be written to {path:?} on `{stage}`"))]
    WriteSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("picker settings at {path:?} could not be replaced on `{stage}`"))]
    ReplaceSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_groups_priority() -> u8 {
    1
}

fn default_emails_priority() -> u8 {
    2
}

fn default_unknown_source_priority() -> u8 {
    DEFAULT_UNKNOWN_SOURCE_PRIORITY
}

fn default_abort_superseded_fetches() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "roster-picker-settings-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(scratch_dir("missing").join(SETTINGS_FILE_NAME));
        assert_eq!(*store.settings(), PickerSettings::default());
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let dir = scratch_dir("partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"unknown_source_priority": 0, "source_priorities": {"emails": 5}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();

        assert_eq!(settings.unknown_source_priority, 0);
        assert_eq!(settings.source_priorities.emails, 5);
        assert_eq!(settings.source_priorities.groups, 1);
        assert!(settings.abort_superseded_fetches);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = scratch_dir("malformed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(*SettingsStore::new(path).settings(), PickerSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let path = scratch_dir("update").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());
        let updated = PickerSettings {
            trim_search_query: true,
            abort_superseded_fetches: false,
            ..PickerSettings::default()
        };

        assert!(store.update(updated.clone()).unwrap());

        assert_eq!(*store.settings(), updated);
        assert_eq!(*SettingsStore::new(path.clone()).settings(), updated);
        assert!(!path.with_extension("json.partial").exists());
    }

    #[test]
    fn unchanged_update_leaves_disk_alone() {
        let path = scratch_dir("unchanged").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        assert!(!store.update(PickerSettings::default()).unwrap());
        assert!(!path.exists());
        assert_eq!(store.config_path(), path.as_path());
    }

    #[test]
    fn unknown_sources_use_fallback_priority() {
        let settings = PickerSettings::default();

        assert_eq!(settings.priority_of(&ParticipantSource::Users), 0);
        assert_eq!(settings.priority_of(&ParticipantSource::Circles), 0);
        assert_eq!(settings.priority_of(&ParticipantSource::Groups), 1);
        assert_eq!(settings.priority_of(&ParticipantSource::Emails), 2);
        assert_eq!(
            settings.priority_of(&ParticipantSource::Other("rooms".to_string())),
            DEFAULT_UNKNOWN_SOURCE_PRIORITY
        );
    }

    #[test]
    fn trimming_treats_blank_queries_as_absent() {
        let trimming = PickerSettings {
            trim_search_query: true,
            ..PickerSettings::default()
        };

        assert_eq!(trimming.normalize_query(Some("  ".to_string())), None);
        assert_eq!(
            trimming.normalize_query(Some(" bob ".to_string())),
            Some("bob".to_string())
        );
        assert_eq!(
            PickerSettings::default().normalize_query(Some(" bob ".to_string())),
            Some(" bob ".to_string())
        );
    }
}
