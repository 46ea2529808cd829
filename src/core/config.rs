/*
 * Manages application-specific configuration settings: the sync policy applied at
 * startup, the location of the remote catalog document, and the time of the last
 * successful sync. Settings are persisted as JSON in the local configuration
 * directory provided by `path_utils`.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) so tests and other
 * front ends can substitute their own storage. The settings are read once at
 * startup by the caller; the sync core never reads them itself.
 */
use crate::core::path_utils;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    NoProjectDirectory,
    Serde(serde_json::Error),
    Timestamp(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serde(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::NoProjectDirectory => {
                write!(f, "Could not determine directory for configuration")
            }
            ConfigError::Serde(e) => write!(f, "Configuration file format error: {e}"),
            ConfigError::Timestamp(e) => write!(f, "Configuration timestamp error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/*
 * When the application should refresh the catalog on its own.
 * `WifiOnly` is recognized and stored, but detecting the network type is left to
 * the front end; the core treats it like `ManualOnly`.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    #[default]
    ManualOnly,
    OnStartup,
    WifiOnly,
}

impl SyncPolicy {
    pub fn syncs_on_startup(self) -> bool {
        self == SyncPolicy::OnStartup
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub sync_policy: SyncPolicy,
    pub catalog_source: Option<PathBuf>,
    /* RFC 3339 timestamp of the last sync that was also saved to disk. */
    pub last_successful_sync: Option<String>,
}

impl AppSettings {
    pub fn record_successful_sync(&mut self, at: OffsetDateTime) -> Result<()> {
        let formatted = at
            .format(&Rfc3339)
            .map_err(|e| ConfigError::Timestamp(e.to_string()))?;
        self.last_successful_sync = Some(formatted);
        Ok(())
    }

    pub fn last_successful_sync_time(&self) -> Result<Option<OffsetDateTime>> {
        self.last_successful_sync
            .as_deref()
            .map(|text| {
                OffsetDateTime::parse(text, &Rfc3339)
                    .map_err(|e| ConfigError::Timestamp(e.to_string()))
            })
            .transpose()
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn load_settings(&self, app_name: &str) -> Result<AppSettings>;
    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()>;
}

fn read_settings_file(file_path: &Path) -> Result<AppSettings> {
    if !file_path.exists() {
        log::debug!("CoreConfigManager: Settings file {file_path:?} does not exist.");
        return Ok(AppSettings::default());
    }

    let mut contents = String::new();
    BufReader::new(File::open(file_path)?).read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        log::debug!("CoreConfigManager: Settings file {file_path:?} is empty.");
        return Ok(AppSettings::default());
    }

    let settings: AppSettings = serde_json::from_str(&contents)?;
    log::debug!("CoreConfigManager: Loaded settings {settings:?} from {file_path:?}.");
    Ok(settings)
}

fn write_settings_file(file_path: &Path, settings: &AppSettings) -> Result<()> {
    let mut writer = BufWriter::new(File::create(file_path)?);
    serde_json::to_writer_pretty(&mut writer, settings)?;
    writer.flush()?;
    log::debug!("CoreConfigManager: Saved settings {settings:?} to {file_path:?}.");
    Ok(())
}

/*
 * Stores settings under the platform configuration directory. Tests pin the
 * directory with `with_config_dir`.
 */
pub struct CoreConfigManager {
    config_dir_override: Option<PathBuf>,
}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {
            config_dir_override: None,
        }
    }

    #[cfg(test)]
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        CoreConfigManager {
            config_dir_override: Some(config_dir),
        }
    }

    fn settings_path(&self, app_name: &str) -> Result<PathBuf> {
        let config_dir = match &self.config_dir_override {
            Some(dir) => dir.clone(),
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(ConfigError::NoProjectDirectory)?,
        };
        Ok(config_dir.join(SETTINGS_FILENAME))
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    fn load_settings(&self, app_name: &str) -> Result<AppSettings> {
        log::trace!("CoreConfigManager: Loading settings for app '{app_name}'");
        read_settings_file(&self.settings_path(app_name)?)
    }

    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()> {
        log::trace!("CoreConfigManager: Saving settings for app '{app_name}'");
        write_settings_file(&self.settings_path(app_name)?, settings)
    }
}
