/*
 * This module consolidates the core, UI-independent logic of the application: the
 * catalog model, the lock-guarded record store shared with the sync worker, the
 * two-file persistence codec, the remote source abstraction with its JSON catalog
 * provider, the cancellable synchronizer, and the application settings. Trait
 * seams (`CatalogPersistenceOperations`, `RemoteSourceProvider`,
 * `ConfigManagerOperations`) allow the app logic to be tested with mocks.
 */
pub mod checksum_utils;
pub mod config;
pub mod models;
pub mod path_utils;
pub mod persistence;
pub mod record_store;
pub mod remote_source;
pub mod sync_progress;
pub mod synchronizer;

// Re-export key structures
pub use models::Invertebrate;
pub use record_store::RecordStore;

// Re-export persistence related items
pub use persistence::{CatalogPersistenceOperations, CoreCatalogPersistence, PersistenceError};
#[cfg(test)]
pub use {
    models::CatalogSnapshot,
    persistence::{CatalogFile, LoadedCatalog},
};

// Re-export config related items
pub use config::{AppSettings, ConfigManagerOperations, CoreConfigManager, SyncPolicy};

// Re-export sync related items
pub use remote_source::{JsonCatalogProvider, RemoteSourceProvider};
pub use sync_progress::{SyncEvent, SyncOutcome};
pub use synchronizer::{CancellationToken, Synchronizer};
