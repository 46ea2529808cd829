/*
 * This module implements the background catalog refresh. A `Synchronizer` opens a
 * fresh remote source, fetches it unit by unit, and merges every unit into the
 * shared `RecordStore` as soon as it arrives, so readers see progress while the
 * run continues. Each merged unit is reported as a `SyncEvent::Progress`; the run
 * ends with exactly one `SyncEvent::Finished`.
 *
 * A run moves from running to one of three terminal outcomes:
 * - `Succeeded` when the source reports the end of its data,
 * - `Failed` on the first fetch or parse error (units merged earlier stay merged),
 * - `Cancelled` when the cancellation token is seen set at a checkpoint.
 *
 * `run` consumes the synchronizer, so a run cannot be restarted. Cancellation is
 * cooperative: the token is only checked before each fetch, and a fetch already in
 * progress completes (and is merged) before the run stops.
 */
use super::record_store::RecordStore;
use super::remote_source::RemoteSourceProvider;
use super::sync_progress::{SyncEvent, SyncOutcome, SyncProgress};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

const SYNC_THREAD_NAME: &str = "catalog-sync";

/*
 * Shared "stop at the next checkpoint" flag. Cloning shares the flag. Cancelling
 * is idempotent and never blocks.
 */
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("CancellationToken: Cancellation requested.");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct Synchronizer {
    provider: Arc<dyn RemoteSourceProvider>,
    store: Arc<RecordStore>,
    token: CancellationToken,
    events: Sender<SyncEvent>,
}

impl Synchronizer {
    pub fn new(
        provider: Arc<dyn RemoteSourceProvider>,
        store: Arc<RecordStore>,
        token: CancellationToken,
        events: Sender<SyncEvent>,
    ) -> Self {
        Synchronizer {
            provider,
            store,
            token,
            events,
        }
    }

    /*
     * Starts the run on a dedicated worker thread. The join handle yields the same
     * outcome that is sent as the final event.
     */
    pub fn spawn(self) -> io::Result<JoinHandle<SyncOutcome>> {
        thread::Builder::new()
            .name(SYNC_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    /*
     * Executes the run on the calling thread and returns its outcome after sending
     * it as `SyncEvent::Finished`.
     */
    pub fn run(self) -> SyncOutcome {
        log::info!("Synchronizer: Sync run started.");
        let outcome = self.sync_units();
        match &outcome {
            SyncOutcome::Succeeded { units_merged } => {
                log::info!("Synchronizer: Sync succeeded after {units_merged} unit(s).")
            }
            SyncOutcome::Failed {
                reason,
                units_merged,
            } => log::warn!("Synchronizer: Sync failed after {units_merged} unit(s): {reason}"),
            SyncOutcome::Cancelled { units_merged } => {
                log::info!("Synchronizer: Sync cancelled after {units_merged} unit(s).")
            }
        }
        if self
            .events
            .send(SyncEvent::Finished(outcome.clone()))
            .is_err()
        {
            log::warn!("Synchronizer: Nobody is listening for the sync outcome.");
        }
        outcome
    }

    fn sync_units(&self) -> SyncOutcome {
        let mut units_merged = 0usize;
        let mut source = match self.provider.open() {
            Ok(source) => source,
            Err(e) => {
                return SyncOutcome::Failed {
                    reason: e.to_string(),
                    units_merged,
                };
            }
        };
        let total_units = source.unit_count_hint();

        loop {
            // Checkpoint.
            if self.token.is_cancelled() {
                return SyncOutcome::Cancelled { units_merged };
            }

            let unit = match source.fetch_next_unit() {
                Ok(Some(unit)) => unit,
                Ok(None) => return SyncOutcome::Succeeded { units_merged },
                Err(e) => {
                    return SyncOutcome::Failed {
                        reason: e.to_string(),
                        units_merged,
                    };
                }
            };

            self.store.merge_unit(unit.streams, unit.invertebrates);
            units_merged += 1;
            log::debug!("Synchronizer: Merged unit '{}'.", unit.label);

            let progress = SyncProgress {
                unit_label: unit.label,
                units_completed: units_merged,
                total_units,
            };
            if self.events.send(SyncEvent::Progress(progress)).is_err() {
                log::trace!("Synchronizer: Progress receiver dropped; continuing.");
            }
        }
    }
}
