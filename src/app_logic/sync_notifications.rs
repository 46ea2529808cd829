/*
 * Defines the boundary between the sync coordinator and whatever presents it:
 * the notifications the coordinator publishes to its subscribers, and the
 * confirmation prompts it needs answered. Front ends implement
 * `SyncPromptOperations`; tests substitute a scripted mock.
 */
use crate::core::SyncOutcome;
use std::time::Duration;

// How long transient status messages stay visible.
pub const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/*
 * Whether the "sync" affordance should offer to start a sync or show that one is
 * running.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAvailability {
    ReadyToSync,
    Syncing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNotification {
    /* A transient status-bar message. */
    StatusMessage { text: String, timeout: Duration },
    SyncAvailabilityChanged(SyncAvailability),
    /* Published exactly once per sync run. `saved` is true only if the catalog was written to disk. */
    SyncFinished { outcome: SyncOutcome, saved: bool },
}

impl UiNotification {
    pub fn status(text: impl Into<String>) -> Self {
        UiNotification::StatusMessage {
            text: text.into(),
            timeout: STATUS_MESSAGE_TIMEOUT,
        }
    }
}

/*
 * Questions the coordinator asks the user. The meaning of a `true` answer:
 * - `FirstRunConsent`: download the catalog now.
 * - `SyncStarted`: keep the sync that just started running.
 * - `AlreadySyncing`: cancel the sync that is already running.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPrompt {
    FirstRunConsent,
    SyncStarted,
    AlreadySyncing,
}

impl SyncPrompt {
    pub fn heading(self) -> &'static str {
        match self {
            SyncPrompt::FirstRunConsent => "Welcome new user!",
            SyncPrompt::SyncStarted => "Data syncing has begun!",
            SyncPrompt::AlreadySyncing => "Data is already syncing. Cancel?",
        }
    }

    pub fn details(self) -> Option<&'static str> {
        match self {
            SyncPrompt::FirstRunConsent => Some(
                "Thank you for installing this app. In order for it to be useful it needs to sync data. This takes up less than 5 megabytes of space.",
            ),
            SyncPrompt::SyncStarted => Some(
                "Sync has begun. Items will be updated as they are completed. If you wish to stop, press cancel.",
            ),
            SyncPrompt::AlreadySyncing => None,
        }
    }
}

pub trait SyncPromptOperations: Send + Sync {
    fn confirm(&self, prompt: SyncPrompt) -> bool;
}
