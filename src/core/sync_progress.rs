/*
 * Defines the messages that flow from a sync worker to the thread that owns the
 * sync run. A run emits any number of `SyncEvent::Progress` messages, one per
 * merged unit, followed by exactly one `SyncEvent::Finished` carrying the terminal
 * outcome. The types are plain data so consumers stay decoupled from the worker.
 */

/*
 * Describes one merged unit. `total_units` is only known when the remote source
 * reports it up front.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub unit_label: String,
    pub units_completed: usize,
    pub total_units: Option<usize>,
}

impl SyncProgress {
    // Status-bar text for this step.
    pub fn message(&self) -> String {
        match self.total_units {
            Some(total) => format!(
                "Synced {} ({} of {})",
                self.unit_label, self.units_completed, total
            ),
            None => format!("Synced {} ({} so far)", self.unit_label, self.units_completed),
        }
    }
}

/*
 * Terminal status of a sync run. Units merged before the run ended stay in the
 * record store whatever the outcome, so every variant reports how many there were.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Succeeded { units_merged: usize },
    Failed { reason: String, units_merged: usize },
    Cancelled { units_merged: usize },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Succeeded { .. })
    }

    pub fn units_merged(&self) -> usize {
        match self {
            SyncOutcome::Succeeded { units_merged }
            | SyncOutcome::Failed { units_merged, .. }
            | SyncOutcome::Cancelled { units_merged } => *units_merged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Progress(SyncProgress),
    Finished(SyncOutcome),
}
