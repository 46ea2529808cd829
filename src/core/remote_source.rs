/*
 * Defines how the synchronizer obtains fresh catalog data. The core only knows a
 * `RemoteSource` as something that yields units of work until it runs out or
 * fails; a `RemoteSourceProvider` opens a fresh source for every sync run.
 *
 * `JsonCatalogProvider` is the concrete provider shipped with the application. It
 * reads a catalog document listing streams with their invertebrates and yields
 * one unit per stream. Each stream entry is decoded only when its unit is fetched,
 * so a malformed entry fails the run at that unit, after earlier units were merged.
 */
use super::models::{Invertebrate, InvertebrateMap, Stream, StreamMap};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum RemoteFetchError {
    Io(io::Error),
    Parse(serde_json::Error),
    Malformed(String),
    Unavailable(String),
}

impl From<io::Error> for RemoteFetchError {
    fn from(err: io::Error) -> Self {
        RemoteFetchError::Io(err)
    }
}

impl From<serde_json::Error> for RemoteFetchError {
    fn from(err: serde_json::Error) -> Self {
        RemoteFetchError::Parse(err)
    }
}

impl std::fmt::Display for RemoteFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFetchError::Io(e) => write!(f, "Remote catalog I/O error: {e}"),
            RemoteFetchError::Parse(e) => write!(f, "Remote catalog parse error: {e}"),
            RemoteFetchError::Malformed(msg) => write!(f, "Remote catalog is malformed: {msg}"),
            RemoteFetchError::Unavailable(msg) => write!(f, "Remote catalog unavailable: {msg}"),
        }
    }
}

impl std::error::Error for RemoteFetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteFetchError::Io(e) => Some(e),
            RemoteFetchError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteFetchError>;

/*
 * The smallest piece of remote data merged in one step. `label` names the unit in
 * progress messages (for the JSON provider, the stream title).
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncUnit {
    pub label: String,
    pub streams: StreamMap,
    pub invertebrates: InvertebrateMap,
}

pub trait RemoteSource: Send {
    /*
     * Fetches the next unit. `Ok(None)` signals the end of the data; an error
     * aborts the run. May block on I/O.
     */
    fn fetch_next_unit(&mut self) -> Result<Option<SyncUnit>>;

    // Total number of units, if the source knows it up front.
    fn unit_count_hint(&self) -> Option<usize> {
        None
    }
}

pub trait RemoteSourceProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn RemoteSource>>;
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    streams: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    title: String,
    #[serde(default)]
    invertebrates: Vec<Invertebrate>,
}

impl StreamEntry {
    fn into_unit(self) -> Result<SyncUnit> {
        if self.title.trim().is_empty() {
            return Err(RemoteFetchError::Malformed(
                "stream entry without a title".to_string(),
            ));
        }
        if let Some(position) = self
            .invertebrates
            .iter()
            .position(|invertebrate| invertebrate.name.trim().is_empty())
        {
            return Err(RemoteFetchError::Malformed(format!(
                "invertebrate #{} of stream '{}' has no name",
                position + 1,
                self.title
            )));
        }

        let names = self
            .invertebrates
            .iter()
            .map(|invertebrate| invertebrate.name.clone())
            .collect();
        let invertebrates = self
            .invertebrates
            .into_iter()
            .map(|invertebrate| (invertebrate.name.clone(), invertebrate))
            .collect();
        let stream = Stream::new(self.title.clone(), names);
        Ok(SyncUnit {
            label: self.title.clone(),
            streams: StreamMap::from([(self.title, stream)]),
            invertebrates,
        })
    }
}

struct JsonCatalogSource {
    entries: std::vec::IntoIter<serde_json::Value>,
    total: usize,
    fetched: usize,
}

impl RemoteSource for JsonCatalogSource {
    fn fetch_next_unit(&mut self) -> Result<Option<SyncUnit>> {
        let Some(value) = self.entries.next() else {
            return Ok(None);
        };
        self.fetched += 1;
        let entry: StreamEntry = serde_json::from_value(value)?;
        log::trace!(
            "JsonCatalogSource: Decoded stream '{}' ({} of {}).",
            entry.title,
            self.fetched,
            self.total
        );
        entry.into_unit().map(Some)
    }

    fn unit_count_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

pub struct JsonCatalogProvider {
    path: PathBuf,
}

impl JsonCatalogProvider {
    pub fn new(path: PathBuf) -> Self {
        JsonCatalogProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RemoteSourceProvider for JsonCatalogProvider {
    fn open(&self) -> Result<Box<dyn RemoteSource>> {
        log::debug!("JsonCatalogProvider: Opening catalog document {:?}", self.path);
        if !self.path.exists() {
            return Err(RemoteFetchError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        let document: CatalogDocument =
            serde_json::from_reader(BufReader::new(File::open(&self.path)?))?;
        let total = document.streams.len();
        log::info!("JsonCatalogProvider: Catalog lists {total} stream(s).");
        Ok(Box::new(JsonCatalogSource {
            entries: document.streams.into_iter(),
            total,
            fetched: 0,
        }))
    }
}
