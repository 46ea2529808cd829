/*
 * A line-oriented front end for the sync coordinator. Standard input is read on a
 * dedicated thread and handed over through a channel, so the interactive loop can
 * keep relaying sync progress while it waits for the next command. The same
 * channel answers the coordinator's confirmation prompts.
 *
 * The front end is also where the time of the last saved sync is recorded in the
 * application settings.
 */
use crate::app_logic::{
    APP_NAME, StartSyncResult, SyncAvailability, SyncCoordinator, SyncPrompt,
    SyncPromptOperations, UiNotification,
};
use crate::core::{AppSettings, ConfigManagerOperations, SyncOutcome};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub type ConsoleLines = Arc<Mutex<Receiver<String>>>;

/*
 * Starts the thread that forwards stdin lines. The channel disconnects when stdin
 * reaches end of file.
 */
pub fn spawn_stdin_reader() -> io::Result<ConsoleLines> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("ConsoleFrontend: Failed to read from stdin: {e}");
                        break;
                    }
                }
            }
            log::debug!("ConsoleFrontend: Input reader finished.");
        })?;
    Ok(Arc::new(Mutex::new(rx)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Streams,
    Stream(String),
    Item(String),
    Sync,
    Stop,
    Status,
    Help,
    Quit,
    Unknown(String),
}

// Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, argument) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match (verb.to_ascii_lowercase().as_str(), argument) {
        ("streams", "") => ConsoleCommand::Streams,
        ("stream", title) if !title.is_empty() => ConsoleCommand::Stream(title.to_string()),
        ("item", name) if !name.is_empty() => ConsoleCommand::Item(name.to_string()),
        ("sync", "") => ConsoleCommand::Sync,
        ("stop", "") => ConsoleCommand::Stop,
        ("status", "") => ConsoleCommand::Status,
        ("help", "") => ConsoleCommand::Help,
        ("quit", "") | ("exit", "") => ConsoleCommand::Quit,
        _ => ConsoleCommand::Unknown(line.to_string()),
    };
    Some(command)
}

/*
 * Interprets a prompt answer. Anything that is not clearly yes or no (including
 * an empty line) takes the prompt's default.
 */
pub fn parse_answer(line: &str, default: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" | "c" | "cancel" => false,
        _ => default,
    }
}

fn default_answer(prompt: SyncPrompt) -> bool {
    !matches!(prompt, SyncPrompt::AlreadySyncing)
}

pub struct ConsolePrompter {
    lines: ConsoleLines,
}

impl ConsolePrompter {
    pub fn new(lines: ConsoleLines) -> Self {
        ConsolePrompter { lines }
    }
}

impl SyncPromptOperations for ConsolePrompter {
    fn confirm(&self, prompt: SyncPrompt) -> bool {
        let default = default_answer(prompt);
        println!("{}", prompt.heading());
        if let Some(details) = prompt.details() {
            println!("{details}");
        }
        print!("{} ", if default { "[Y/n]" } else { "[y/N]" });
        let _ = io::stdout().flush();

        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        match lines.recv() {
            Ok(line) => parse_answer(&line, default),
            Err(_) => {
                log::debug!("ConsolePrompter: Input closed while asking {prompt:?}.");
                // Closed input: never consent, never cancel.
                matches!(prompt, SyncPrompt::SyncStarted)
            }
        }
    }
}

pub struct ConsoleFrontend {
    coordinator: SyncCoordinator,
    notifications: Receiver<UiNotification>,
    config_manager: Arc<dyn ConfigManagerOperations>,
    settings: AppSettings,
}

impl ConsoleFrontend {
    pub fn new(
        mut coordinator: SyncCoordinator,
        config_manager: Arc<dyn ConfigManagerOperations>,
        settings: AppSettings,
    ) -> Self {
        let notifications = coordinator.subscribe();
        ConsoleFrontend {
            coordinator,
            notifications,
            config_manager,
            settings,
        }
    }

    pub fn coordinator_mut(&mut self) -> &mut SyncCoordinator {
        &mut self.coordinator
    }

    #[cfg(test)]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /*
     * Runs until `quit` or end of input, then shuts the coordinator down.
     */
    pub fn run(&mut self, lines: &ConsoleLines) {
        println!("Type 'help' for a list of commands.");
        loop {
            self.coordinator.process_sync_events();
            self.handle_notifications();

            // Released before executing, since prompts read from the same channel.
            let next = lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv_timeout(POLL_INTERVAL);
            match next {
                Ok(line) => {
                    if let Some(command) = parse_command(&line) {
                        if !self.execute(command) {
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("ConsoleFrontend: Input closed; exiting.");
                    break;
                }
            }
        }
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        if let Some(outcome) = self.coordinator.shutdown(SHUTDOWN_GRACE) {
            log::info!("ConsoleFrontend: Sync ended during shutdown: {outcome:?}");
        }
        self.handle_notifications();
    }

    // Returns false when the loop should end.
    pub fn execute(&mut self, command: ConsoleCommand) -> bool {
        log::debug!("ConsoleFrontend: Executing {command:?}");
        match command {
            ConsoleCommand::Streams => {
                let titles = self.coordinator.stream_titles();
                if titles.is_empty() {
                    println!("No streams stored. Type 'sync' to download the catalog.");
                }
                for title in titles {
                    println!("  {title}");
                }
            }
            ConsoleCommand::Stream(title) => {
                if self.coordinator.record_store().stream(&title).is_none() {
                    println!("No stream titled '{title}'.");
                    return true;
                }
                let invertebrates = self.coordinator.invertebrates_for_stream(&title);
                if invertebrates.is_empty() {
                    println!("No invertebrates stored for '{title}'.");
                }
                for invertebrate in invertebrates {
                    println!("  {}", invertebrate.name);
                }
            }
            ConsoleCommand::Item(name) => match self.coordinator.invertebrate(&name) {
                Some(invertebrate) => {
                    println!("{}", invertebrate.name);
                    for (key, value) in &invertebrate.attributes {
                        println!("  {key}: {value}");
                    }
                }
                None => println!("No invertebrate named '{name}'."),
            },
            ConsoleCommand::Sync => match self.coordinator.start_sync() {
                StartSyncResult::Started => {}
                StartSyncResult::AlreadySyncing { stop_requested } => {
                    if stop_requested {
                        println!("Stopping the running sync.");
                    }
                }
                StartSyncResult::Declined => println!("Sync skipped."),
                StartSyncResult::NotStarted => println!("Sync could not be started."),
            },
            ConsoleCommand::Stop => {
                if self.coordinator.is_syncing_now() {
                    self.coordinator.request_stop();
                    println!("Stop requested.");
                } else {
                    println!("No sync is running.");
                }
            }
            ConsoleCommand::Status => self.print_status(),
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => return false,
            ConsoleCommand::Unknown(line) => {
                println!("Unknown command '{line}'. Type 'help' for a list of commands.");
            }
        }
        true
    }

    fn print_status(&self) {
        let (streams, invertebrates) = self.coordinator.record_store().counts();
        println!("{streams} stream(s), {invertebrates} invertebrate(s) stored.");
        if self.coordinator.is_syncing_now() {
            println!("A sync is running.");
        }
        match self.settings.last_successful_sync_time() {
            Ok(Some(at)) => println!("Last successful sync: {at}"),
            Ok(None) => println!("Never synced."),
            Err(e) => log::warn!("ConsoleFrontend: Ignoring unreadable sync timestamp: {e}"),
        }
    }

    pub fn handle_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            match notification {
                UiNotification::StatusMessage { text, .. } => println!("[status] {text}"),
                UiNotification::SyncAvailabilityChanged(SyncAvailability::Syncing) => {
                    println!("[sync] Running. Type 'stop' to cancel.");
                }
                UiNotification::SyncAvailabilityChanged(SyncAvailability::ReadyToSync) => {}
                UiNotification::SyncFinished { outcome, saved } => {
                    self.on_sync_finished(&outcome, saved);
                }
            }
        }
    }

    fn on_sync_finished(&mut self, outcome: &SyncOutcome, saved: bool) {
        log::info!(
            "ConsoleFrontend: Sync finished with {} unit(s) merged: {outcome:?} (saved: {saved})",
            outcome.units_merged()
        );
        if !(outcome.is_success() && saved) {
            return;
        }
        if let Err(e) = self
            .settings
            .record_successful_sync(OffsetDateTime::now_utc())
        {
            log::error!("ConsoleFrontend: Unable to record sync time: {e}");
            return;
        }
        if let Err(e) = self.config_manager.save_settings(APP_NAME, &self.settings) {
            log::error!("ConsoleFrontend: Failed to save settings: {e}");
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  streams         list stored streams");
    println!("  stream <title>  list the invertebrates of a stream");
    println!("  item <name>     show one invertebrate");
    println!("  sync            download the catalog");
    println!("  stop            cancel a running sync");
    println!("  status          show stored counts and the last sync time");
    println!("  quit            exit");
}
