/*
 * Owns the record store and the lifecycle of sync runs. The coordinator is driven
 * from the interactive thread: it loads the local catalog at startup, starts at
 * most one synchronizer at a time, relays the worker's progress to subscribers,
 * and saves the catalog once a run succeeds.
 *
 * The worker never touches coordinator state. It reports through a channel that
 * the interactive thread drains with `process_sync_events` (or `wait_for_sync`
 * when it can afford to block), so `is_syncing_now` is only ever changed here.
 * Every failure ends as a notification; none of them is fatal.
 */
use super::sync_notifications::{
    SyncAvailability, SyncPrompt, SyncPromptOperations, UiNotification,
};
use crate::core::{
    CancellationToken, CatalogPersistenceOperations, Invertebrate, PersistenceError,
    RecordStore, RemoteSourceProvider, SyncEvent, SyncOutcome, SyncPolicy, Synchronizer,
};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSyncResult {
    Started,
    /* A run was already active; no second worker was started. */
    AlreadySyncing { stop_requested: bool },
    /* The user declined the first-run download. Nothing changed. */
    Declined,
    /* The worker thread could not be spawned. */
    NotStarted,
}

struct ActiveSyncRun {
    token: CancellationToken,
    events: Receiver<SyncEvent>,
    worker: Option<JoinHandle<SyncOutcome>>,
    units_reported: usize,
}

pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    persistence: Arc<dyn CatalogPersistenceOperations>,
    source_provider: Arc<dyn RemoteSourceProvider>,
    prompts: Arc<dyn SyncPromptOperations>,
    is_syncing_now: bool,
    active_run: Option<ActiveSyncRun>,
    subscribers: Vec<Sender<UiNotification>>,
}

impl SyncCoordinator {
    pub fn new(
        persistence: Arc<dyn CatalogPersistenceOperations>,
        source_provider: Arc<dyn RemoteSourceProvider>,
        prompts: Arc<dyn SyncPromptOperations>,
    ) -> Self {
        SyncCoordinator {
            store: Arc::new(RecordStore::new()),
            persistence,
            source_provider,
            prompts,
            is_syncing_now: false,
            active_run: None,
            subscribers: Vec::new(),
        }
    }

    /*
     * Registers a new listener. Listeners whose receiver has been dropped are
     * forgotten on the next notification.
     */
    pub fn subscribe(&mut self) -> Receiver<UiNotification> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, notification: UiNotification) {
        log::trace!("SyncCoordinator: Notifying {notification:?}");
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }

    pub fn record_store(&self) -> &RecordStore {
        &self.store
    }

    pub fn is_syncing_now(&self) -> bool {
        self.is_syncing_now
    }

    pub fn stream_titles(&self) -> Vec<String> {
        self.store.stream_titles()
    }

    pub fn invertebrates_for_stream(&self, title: &str) -> Vec<Invertebrate> {
        self.store.invertebrates_for_stream(title)
    }

    pub fn invertebrate(&self, name: &str) -> Option<Invertebrate> {
        self.store.invertebrate(name)
    }

    /*
     * Merges the persisted catalog into the store. Returns whether a sync is
     * required because local data is missing. A collection that fails to load
     * leaves its part of the store untouched and the user is told; no sync is
     * forced.
     */
    pub fn load_local_catalog(&mut self) -> Result<bool, PersistenceError> {
        match self.persistence.load() {
            Ok(loaded) => {
                self.store.merge_streams(loaded.streams);
                match loaded.invertebrate_error {
                    None => self.store.merge_invertebrates(loaded.invertebrates),
                    Some(e) => {
                        log::error!("SyncCoordinator: Loaded streams only: {e}");
                        self.notify(UiNotification::status(format!(
                            "Unable to load local data. {e}"
                        )));
                    }
                }
                Ok(loaded.sync_required)
            }
            Err(e) => {
                log::error!("SyncCoordinator: Unable to load local catalog: {e}");
                self.notify(UiNotification::status(format!(
                    "Unable to load local data. {e}"
                )));
                Err(e)
            }
        }
    }

    /*
     * Loads the local catalog and starts at most one sync: when local data is
     * missing, or when the policy asks for a sync on every startup.
     */
    pub fn startup(&mut self, policy: SyncPolicy) -> Option<StartSyncResult> {
        let sync_required = self.load_local_catalog().unwrap_or(false);
        if sync_required || policy.syncs_on_startup() {
            log::info!(
                "SyncCoordinator: Starting sync at startup (required: {sync_required}, policy: {policy:?})."
            );
            Some(self.start_sync())
        } else {
            None
        }
    }

    pub fn start_sync(&mut self) -> StartSyncResult {
        if self.is_syncing_now {
            log::info!("SyncCoordinator: Sync requested while one is already running.");
            let stop_requested = self.prompts.confirm(SyncPrompt::AlreadySyncing);
            if stop_requested {
                self.request_stop();
            }
            return StartSyncResult::AlreadySyncing { stop_requested };
        }

        let sync_is_required = self.store.is_empty();
        if sync_is_required && !self.prompts.confirm(SyncPrompt::FirstRunConsent) {
            log::info!("SyncCoordinator: User declined the initial sync.");
            return StartSyncResult::Declined;
        }

        let token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel();
        let synchronizer = Synchronizer::new(
            Arc::clone(&self.source_provider),
            Arc::clone(&self.store),
            token.clone(),
            events_tx,
        );
        let worker = match synchronizer.spawn() {
            Ok(worker) => worker,
            Err(e) => {
                log::error!("SyncCoordinator: Failed to spawn sync worker: {e}");
                self.notify(UiNotification::status(format!("Unable to start sync: {e}")));
                return StartSyncResult::NotStarted;
            }
        };

        self.is_syncing_now = true;
        self.active_run = Some(ActiveSyncRun {
            token,
            events: events_rx,
            worker: Some(worker),
            units_reported: 0,
        });
        self.notify(UiNotification::SyncAvailabilityChanged(
            SyncAvailability::Syncing,
        ));

        // Only a user-initiated sync gets the "cancel?" follow-up.
        if !sync_is_required && !self.prompts.confirm(SyncPrompt::SyncStarted) {
            self.request_stop();
        }
        StartSyncResult::Started
    }

    pub fn request_stop(&self) {
        match &self.active_run {
            Some(run) => run.token.cancel(),
            None => log::trace!("SyncCoordinator: Stop requested with no active sync."),
        }
    }

    /*
     * Drains pending worker events without blocking. Returns the outcome if the
     * active run finished during this call.
     */
    pub fn process_sync_events(&mut self) -> Option<SyncOutcome> {
        while let Some(event) = self.receive_event(None) {
            if let Some(outcome) = self.handle_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    /*
     * Blocks up to `timeout` for the active run to finish, relaying progress on the
     * way. Returns `None` if no run was active or it did not finish in time.
     */
    pub fn wait_for_sync(&mut self, timeout: Duration) -> Option<SyncOutcome> {
        let deadline = Instant::now() + timeout;
        while self.active_run.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let event = self.receive_event(Some(remaining))?;
            if let Some(outcome) = self.handle_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    /*
     * Requests cancellation and gives the worker `grace` to reach a checkpoint, so
     * no merge races the teardown of the store.
     */
    pub fn shutdown(&mut self, grace: Duration) -> Option<SyncOutcome> {
        if self.active_run.is_none() {
            return None;
        }
        log::info!("SyncCoordinator: Shutting down; cancelling active sync.");
        self.request_stop();
        let outcome = self.wait_for_sync(grace);
        if self.active_run.is_some() {
            log::warn!(
                "SyncCoordinator: Sync worker did not reach a checkpoint within {grace:?}; detaching it."
            );
        }
        outcome
    }

    /*
     * Receives one event from the active run. A worker that hung up without a
     * final event is reported as a failed run.
     */
    fn receive_event(&self, wait: Option<Duration>) -> Option<SyncEvent> {
        let run = self.active_run.as_ref()?;
        let disconnected = match wait {
            None => match run.events.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Empty) => false,
                Err(TryRecvError::Disconnected) => true,
            },
            Some(timeout) => match run.events.recv_timeout(timeout) {
                Ok(event) => return Some(event),
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => true,
            },
        };
        if !disconnected {
            return None;
        }
        Some(SyncEvent::Finished(SyncOutcome::Failed {
            reason: "sync worker stopped unexpectedly".to_string(),
            units_merged: run.units_reported,
        }))
    }

    fn handle_event(&mut self, event: SyncEvent) -> Option<SyncOutcome> {
        match event {
            SyncEvent::Progress(progress) => {
                if let Some(run) = self.active_run.as_mut() {
                    run.units_reported = progress.units_completed;
                }
                self.notify(UiNotification::status(progress.message()));
                None
            }
            SyncEvent::Finished(outcome) => {
                self.finish_run(&outcome);
                Some(outcome)
            }
        }
    }

    fn finish_run(&mut self, outcome: &SyncOutcome) {
        if let Some(mut run) = self.active_run.take() {
            if let Some(worker) = run.worker.take() {
                if worker.join().is_err() {
                    log::error!("SyncCoordinator: Sync worker panicked.");
                }
            }
        }
        self.is_syncing_now = false;

        let saved = match outcome {
            SyncOutcome::Succeeded { .. } => self.persist_catalog(),
            SyncOutcome::Failed { reason, .. } => {
                self.notify(UiNotification::status(format!(
                    "Sync did not complete. Stored data has not been changed. ({reason})"
                )));
                false
            }
            SyncOutcome::Cancelled { .. } => {
                self.notify(UiNotification::status(
                    "Sync did not complete. Stored data has not been changed.",
                ));
                false
            }
        };

        self.notify(UiNotification::SyncFinished {
            outcome: outcome.clone(),
            saved,
        });
        self.notify(UiNotification::SyncAvailabilityChanged(
            SyncAvailability::ReadyToSync,
        ));
    }

    // Snapshot under the lock, write outside it.
    fn persist_catalog(&mut self) -> bool {
        let snapshot = self.store.snapshot();
        match self.persistence.save(&snapshot) {
            Ok(()) => {
                self.notify(UiNotification::status(format!(
                    "Sync complete. {} stream(s) and {} invertebrate(s) saved.",
                    snapshot.streams.len(),
                    snapshot.invertebrates.len()
                )));
                true
            }
            Err(e) if e.leaves_split_state() => {
                log::error!("SyncCoordinator: Local catalog partially saved: {e}");
                self.notify(UiNotification::status(
                    "Sync complete, but local data was only partly saved. It will be repaired by the next successful sync.",
                ));
                false
            }
            Err(e) => {
                log::error!("SyncCoordinator: Unable to save local catalog: {e}");
                self.notify(UiNotification::status(format!(
                    "Sync complete, but local data could not be saved: {e}"
                )));
                false
            }
        }
    }
}
