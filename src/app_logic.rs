/*
 * This module provides the application logic layer, centered around
 * `SyncCoordinator`, which owns the record store and the lifecycle of sync runs,
 * and the notification and prompt types it exchanges with a front end.
 * Unit tests for `SyncCoordinator` are in `sync_coordinator_tests.rs`.
 */
pub mod sync_coordinator;
pub mod sync_notifications;


pub use sync_coordinator::{StartSyncResult, SyncCoordinator};
pub use sync_notifications::{
    SyncAvailability, SyncPrompt, SyncPromptOperations, UiNotification,
};

// Name used for the per-user configuration and data directories.
pub const APP_NAME: &str = "Macroinvertebrates";
