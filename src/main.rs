mod app_logic;
mod console_frontend;
mod core;

use crate::app_logic::{APP_NAME, SyncCoordinator, SyncPromptOperations};
use crate::console_frontend::{ConsoleFrontend, ConsolePrompter};
use crate::core::{
    AppSettings, CatalogPersistenceOperations, ConfigManagerOperations, CoreCatalogPersistence,
    CoreConfigManager, JsonCatalogProvider, RemoteSourceProvider,
};
use std::sync::{Arc, Once};

const LOG_FILENAME: &str = "macroinvertebrates.log";
const DEFAULT_CATALOG_FILENAME: &str = "catalog.json";

static LOGGING_INIT: Once = Once::new();

/*
 * Initializes the global logger once per process. Tests get the test logger so
 * output is captured per test; the application logs to the terminal and to a
 * debug log file in the data directory.
 */
pub fn initialize_logging() {
    LOGGING_INIT.call_once(|| {
        #[cfg(test)]
        {
            let _ = simplelog::TestLogger::init(
                simplelog::LevelFilter::Trace,
                simplelog::Config::default(),
            );
        }
        #[cfg(not(test))]
        {
            use simplelog::{
                ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger,
                TermLogger, TerminalMode, WriteLogger,
            };

            let config = ConfigBuilder::new()
                .set_thread_level(LevelFilter::Debug)
                .build();
            let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
                LevelFilter::Warn,
                config.clone(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            )];
            if let Some(data_dir) = crate::core::path_utils::get_base_app_data_local_dir(APP_NAME) {
                match std::fs::File::create(data_dir.join(LOG_FILENAME)) {
                    Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, file)),
                    Err(e) => eprintln!("Failed to create log file: {e}"),
                }
            }
            if let Err(e) = CombinedLogger::init(loggers) {
                eprintln!("Failed to initialize logger: {e}");
            }
        }
    });
}

fn load_settings(config_manager: &dyn ConfigManagerOperations) -> AppSettings {
    match config_manager.load_settings(APP_NAME) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Main: Failed to load settings, using defaults: {e}");
            AppSettings::default()
        }
    }
}

fn main() {
    initialize_logging();
    log::info!("Main: Starting {APP_NAME}.");

    let persistence = match CoreCatalogPersistence::for_app(APP_NAME) {
        Ok(persistence) => persistence,
        Err(e) => {
            log::error!("Main: {e}");
            eprintln!("Unable to locate the local data directory: {e}");
            std::process::exit(1);
        }
    };

    let config_manager: Arc<dyn ConfigManagerOperations> = Arc::new(CoreConfigManager::new());
    let settings = load_settings(config_manager.as_ref());
    let catalog_source = settings
        .catalog_source
        .clone()
        .unwrap_or_else(|| persistence.data_dir().join(DEFAULT_CATALOG_FILENAME));
    let source_provider = JsonCatalogProvider::new(catalog_source);
    log::info!("Main: Catalog source is {:?}.", source_provider.path());

    let lines = match console_frontend::spawn_stdin_reader() {
        Ok(lines) => lines,
        Err(e) => {
            log::error!("Main: Failed to start input reader: {e}");
            std::process::exit(1);
        }
    };

    let coordinator = SyncCoordinator::new(
        Arc::new(persistence) as Arc<dyn CatalogPersistenceOperations>,
        Arc::new(source_provider) as Arc<dyn RemoteSourceProvider>,
        Arc::new(ConsolePrompter::new(Arc::clone(&lines))) as Arc<dyn SyncPromptOperations>,
    );
    let policy = settings.sync_policy;
    let mut frontend = ConsoleFrontend::new(coordinator, config_manager, settings);
    if let Some(result) = frontend.coordinator_mut().startup(policy) {
        log::debug!("Main: Startup sync: {result:?}");
    }
    frontend.run(&lines);

    log::info!("Main: Exiting.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_logging_installs_test_logger_once() {
        initialize_logging();
        initialize_logging();
        assert!(LOGGING_INIT.is_completed());
        assert_eq!(log::max_level(), log::LevelFilter::Trace);
        log::trace!("Main: Logging is ready for tests.");
    }
}
