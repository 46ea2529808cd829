/*
 * This module provides utility functions for locating and creating the
 * application's per-user directories: the local configuration directory (settings)
 * and the local data directory (persisted catalog files and the log file).
 */
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

fn ensure_dir_exists(kind: &str, dir: &Path) -> Option<PathBuf> {
    if !dir.exists() {
        if let Err(e) = fs::create_dir_all(dir) {
            log::error!("PathUtils: Failed to create {kind} directory {dir:?}: {e}");
            return None;
        }
        log::debug!("PathUtils: Created {kind} directory: {dir:?}");
    } else {
        log::trace!("PathUtils: {kind} directory already exists: {dir:?}");
    }
    Some(dir.to_path_buf())
}

/*
 * Retrieves the application's local (non-roaming) configuration directory,
 * creating it if necessary. Returns `None` if the platform offers no suitable
 * location or the directory cannot be created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Attempting to get base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name)
        .and_then(|proj_dirs| ensure_dir_exists("config", proj_dirs.config_local_dir()))
}

/*
 * Retrieves the application's local data directory, where the catalog files
 * are persisted, creating it if necessary.
 */
pub fn get_base_app_data_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Attempting to get base app data local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name)
        .and_then(|proj_dirs| ensure_dir_exists("data", proj_dirs.data_local_dir()))
}
