/*
 * Persists the catalog to a pair of files in the application data directory:
 * `stream.data` holds the streams and `invertebrate.data` the invertebrates.
 * Each file is a MessagePack envelope carrying a format version, the SHA256 of
 * the payload, and the MessagePack-encoded map itself. The encoding is internal
 * and not guaranteed across format versions.
 *
 * A missing file is not an error: it is reported as "sync required". A stream
 * file that exists but cannot be read or decoded fails the whole load so the
 * caller keeps whatever it already holds in memory; a damaged invertebrate file
 * only loses that collection. Saving writes the stream file first and
 * stops there if it fails; a failure on the invertebrate file leaves the two files
 * describing different catalogs until the next successful save, which callers can
 * detect through `PersistenceError::leaves_split_state`.
 *
 * The operations sit behind `CatalogPersistenceOperations` so the sync coordinator
 * can be exercised with a mock.
 */
use super::checksum_utils;
use super::models::{CatalogSnapshot, InvertebrateMap, StreamMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const STREAM_DATA_FILENAME: &str = "stream.data";
pub const INVERTEBRATE_DATA_FILENAME: &str = "invertebrate.data";
const CATALOG_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFile {
    Streams,
    Invertebrates,
}

impl CatalogFile {
    pub fn file_name(self) -> &'static str {
        match self {
            CatalogFile::Streams => STREAM_DATA_FILENAME,
            CatalogFile::Invertebrates => INVERTEBRATE_DATA_FILENAME,
        }
    }
}

impl std::fmt::Display for CatalogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogFile::Streams => write!(f, "stream"),
            CatalogFile::Invertebrates => write!(f, "invertebrate"),
        }
    }
}

#[derive(Debug)]
pub enum PersistenceError {
    NoDataDirectory,
    Unreadable {
        file: CatalogFile,
        path: PathBuf,
        source: io::Error,
    },
    Corrupt {
        file: CatalogFile,
        path: PathBuf,
        reason: String,
    },
    Write {
        file: CatalogFile,
        path: PathBuf,
        source: io::Error,
    },
    Encode(rmp_serde::encode::Error),
}

impl PersistenceError {
    /*
     * True when the stream file was rewritten but the invertebrate file was not,
     * so the files on disk no longer describe the same catalog.
     */
    pub fn leaves_split_state(&self) -> bool {
        matches!(
            self,
            PersistenceError::Write {
                file: CatalogFile::Invertebrates,
                ..
            }
        )
    }
}

impl From<rmp_serde::encode::Error> for PersistenceError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PersistenceError::Encode(err)
    }
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::NoDataDirectory => {
                write!(f, "Could not determine the local data directory")
            }
            PersistenceError::Unreadable { file, path, source } => write!(
                f,
                "Unable to open local {file} data {}: {source}",
                path.display()
            ),
            PersistenceError::Corrupt { file, path, reason } => write!(
                f,
                "Local {file} data {} is corrupt: {reason}",
                path.display()
            ),
            PersistenceError::Write { file, path, source } => write!(
                f,
                "Unable to write local {file} data {}: {source}",
                path.display()
            ),
            PersistenceError::Encode(e) => write!(f, "Unable to encode local data: {e}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Unreadable { source, .. } => Some(source),
            PersistenceError::Write { source, .. } => Some(source),
            PersistenceError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/*
 * Result of reading the local catalog. Absent files leave the corresponding map
 * empty and set `sync_required`. An invertebrate file that exists but cannot be
 * used is reported in `invertebrate_error`; the streams still load.
 */
#[derive(Debug, Default)]
pub struct LoadedCatalog {
    pub streams: StreamMap,
    pub invertebrates: InvertebrateMap,
    pub sync_required: bool,
    pub invertebrate_error: Option<PersistenceError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEnvelope {
    format_version: u32,
    checksum: String,
    payload: Vec<u8>,
}

pub trait CatalogPersistenceOperations: Send + Sync {
    fn load(&self) -> Result<LoadedCatalog>;
    fn save(&self, snapshot: &CatalogSnapshot) -> Result<()>;
}

pub struct CoreCatalogPersistence {
    data_dir: PathBuf,
}

impl CoreCatalogPersistence {
    pub fn new(data_dir: PathBuf) -> Self {
        CoreCatalogPersistence { data_dir }
    }

    /*
     * Builds a codec rooted in the platform data directory for `app_name`.
     */
    pub fn for_app(app_name: &str) -> Result<Self> {
        super::path_utils::get_base_app_data_local_dir(app_name)
            .map(Self::new)
            .ok_or(PersistenceError::NoDataDirectory)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, file: CatalogFile) -> PathBuf {
        self.data_dir.join(file.file_name())
    }

    /*
     * Reads and decodes one catalog file. Returns `Ok(None)` if the file is absent.
     */
    fn read_collection<T: DeserializeOwned>(&self, file: CatalogFile) -> Result<Option<T>> {
        let path = self.path_for(file);
        let unreadable = |source: io::Error| PersistenceError::Unreadable {
            file,
            path: path.clone(),
            source,
        };
        // Only a definite "not found" counts as absent; other metadata errors fail the load.
        match fs::metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("CoreCatalogPersistence: {path:?} does not exist.");
                return Ok(None);
            }
            Err(e) => return Err(unreadable(e)),
        }
        let mut bytes = Vec::new();
        BufReader::new(File::open(&path).map_err(unreadable)?)
            .read_to_end(&mut bytes)
            .map_err(unreadable)?;

        let corrupt = |reason: String| PersistenceError::Corrupt {
            file,
            path: path.clone(),
            reason,
        };
        let envelope: PersistedEnvelope =
            rmp_serde::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if envelope.format_version != CATALOG_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {CATALOG_FORMAT_VERSION})",
                envelope.format_version
            )));
        }
        if !checksum_utils::checksum_matches(&envelope.payload, &envelope.checksum) {
            return Err(corrupt("payload checksum mismatch".to_string()));
        }
        let collection =
            rmp_serde::from_slice(&envelope.payload).map_err(|e| corrupt(e.to_string()))?;
        log::debug!(
            "CoreCatalogPersistence: Loaded {} byte(s) from {path:?}.",
            bytes.len()
        );
        Ok(Some(collection))
    }

    fn write_collection<T: Serialize>(&self, file: CatalogFile, collection: &T) -> Result<()> {
        let payload = rmp_serde::to_vec(collection)?;
        let envelope = PersistedEnvelope {
            format_version: CATALOG_FORMAT_VERSION,
            checksum: checksum_utils::calculate_sha256_checksum(&payload),
            payload,
        };
        let bytes = rmp_serde::to_vec(&envelope)?;

        let path = self.path_for(file);
        let write_failed = |source: io::Error| PersistenceError::Write {
            file,
            path: path.clone(),
            source,
        };
        let mut writer = BufWriter::new(File::create(&path).map_err(write_failed)?);
        writer.write_all(&bytes).map_err(write_failed)?;
        writer.flush().map_err(write_failed)?;
        log::debug!(
            "CoreCatalogPersistence: Wrote {} byte(s) to {path:?}.",
            bytes.len()
        );
        Ok(())
    }
}

impl CatalogPersistenceOperations for CoreCatalogPersistence {
    fn load(&self) -> Result<LoadedCatalog> {
        log::trace!("CoreCatalogPersistence: Loading catalog from {:?}", self.data_dir);
        let mut loaded = LoadedCatalog::default();

        match self.read_collection::<StreamMap>(CatalogFile::Streams)? {
            Some(streams) => loaded.streams = streams,
            None => {
                // Without streams the invertebrates are useless; a full sync follows.
                loaded.sync_required = true;
                return Ok(loaded);
            }
        }

        match self.read_collection::<InvertebrateMap>(CatalogFile::Invertebrates) {
            Ok(Some(invertebrates)) => loaded.invertebrates = invertebrates,
            Ok(None) => loaded.sync_required = true,
            Err(e) => {
                log::error!("CoreCatalogPersistence: Keeping loaded streams without invertebrates: {e}");
                loaded.invertebrate_error = Some(e);
            }
        }

        log::info!(
            "CoreCatalogPersistence: Loaded {} stream(s) and {} invertebrate(s); sync required: {}.",
            loaded.streams.len(),
            loaded.invertebrates.len(),
            loaded.sync_required
        );
        Ok(loaded)
    }

    fn save(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        log::trace!("CoreCatalogPersistence: Saving catalog to {:?}", self.data_dir);
        self.write_collection(CatalogFile::Streams, &snapshot.streams)?;
        if let Err(e) = self.write_collection(CatalogFile::Invertebrates, &snapshot.invertebrates) {
            log::error!(
                "CoreCatalogPersistence: Stream file updated but invertebrate file was not: {e}"
            );
            return Err(e);
        }
        log::info!(
            "CoreCatalogPersistence: Saved {} stream(s) and {} invertebrate(s).",
            snapshot.streams.len(),
            snapshot.invertebrates.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Invertebrate, Stream};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn sample_snapshot() -> CatalogSnapshot {
        let names = vec![
            "Stonefly".to_string(),
            "Caddisfly".to_string(),
            "Mayfly".to_string(),
        ];
        CatalogSnapshot {
            streams: HashMap::from([
                (
                    "Otter Creek".to_string(),
                    Stream::new("Otter Creek", names.clone()),
                ),
                ("Lewis Creek".to_string(), Stream::new("Lewis Creek", vec![])),
            ]),
            invertebrates: names
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        Invertebrate::new(name.as_str()).with_attribute("description", "larva"),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_save_then_load_round_trips_catalog() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        let snapshot = sample_snapshot();

        persistence.save(&snapshot).unwrap();
        let loaded = persistence.load().unwrap();

        assert!(!loaded.sync_required);
        assert_eq!(loaded.streams, snapshot.streams);
        assert_eq!(loaded.invertebrates, snapshot.invertebrates);
        assert_eq!(
            loaded.streams["Otter Creek"].invertebrate_names,
            vec!["Stonefly", "Caddisfly", "Mayfly"]
        );
    }

    #[test]
    fn test_load_without_files_requires_sync() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());

        let loaded = persistence.load().unwrap();

        assert!(loaded.sync_required);
        assert!(loaded.streams.is_empty());
        assert!(loaded.invertebrates.is_empty());
    }

    #[test]
    fn test_load_with_missing_stream_file_ignores_invertebrate_file() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        persistence.save(&sample_snapshot()).unwrap();
        fs::remove_file(dir.path().join(STREAM_DATA_FILENAME)).unwrap();

        let loaded = persistence.load().unwrap();

        assert!(loaded.sync_required);
        assert!(loaded.invertebrates.is_empty());
    }

    #[test]
    fn test_load_with_missing_invertebrate_file_keeps_streams_and_requires_sync() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        let snapshot = sample_snapshot();
        persistence.save(&snapshot).unwrap();
        fs::remove_file(dir.path().join(INVERTEBRATE_DATA_FILENAME)).unwrap();

        let loaded = persistence.load().unwrap();

        assert!(loaded.sync_required);
        assert_eq!(loaded.streams, snapshot.streams);
        assert!(loaded.invertebrates.is_empty());
    }

    #[test]
    fn test_load_reports_garbage_stream_file_as_corrupt() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STREAM_DATA_FILENAME), b"not a catalog").unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());

        match persistence.load() {
            Err(PersistenceError::Corrupt { file, .. }) => assert_eq!(file, CatalogFile::Streams),
            other => panic!("Expected corrupt stream file, got {other:?}"),
        }
    }

    #[test]
    fn test_load_detects_checksum_mismatch() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        persistence.save(&sample_snapshot()).unwrap();

        let tampered = PersistedEnvelope {
            format_version: CATALOG_FORMAT_VERSION,
            checksum: checksum_utils::calculate_sha256_checksum(b"something else"),
            payload: rmp_serde::to_vec(&InvertebrateMap::new()).unwrap(),
        };
        fs::write(
            dir.path().join(INVERTEBRATE_DATA_FILENAME),
            rmp_serde::to_vec(&tampered).unwrap(),
        )
        .unwrap();

        let loaded = persistence.load().unwrap();
        match loaded.invertebrate_error {
            Some(PersistenceError::Corrupt { file, reason, .. }) => {
                assert_eq!(file, CatalogFile::Invertebrates);
                assert!(reason.contains("checksum"));
            }
            other => panic!("Expected checksum failure, got {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_invertebrate_file_keeps_loaded_streams() {
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        let snapshot = sample_snapshot();
        persistence.save(&snapshot).unwrap();
        fs::write(dir.path().join(INVERTEBRATE_DATA_FILENAME), b"garbage").unwrap();

        let loaded = persistence.load().unwrap();

        assert_eq!(loaded.streams, snapshot.streams);
        assert!(loaded.invertebrates.is_empty());
        // Damaged data is not the same as missing data.
        assert!(!loaded.sync_required);
        let error = loaded.invertebrate_error.expect("damaged file must be reported");
        assert!(error.to_string().starts_with("Local invertebrate data"));
    }

    #[test]
    fn test_load_fails_when_data_directory_cannot_be_inspected() {
        let dir = tempdir().unwrap();
        // A regular file where the data directory should be: looking up the catalog
        // files fails with something other than "not found".
        let blocked = dir.path().join("not_a_directory");
        fs::write(&blocked, b"").unwrap();
        let persistence = CoreCatalogPersistence::new(blocked);

        match persistence.load() {
            Err(PersistenceError::Unreadable { file, .. }) => {
                assert_eq!(file, CatalogFile::Streams)
            }
            other => panic!("Expected unreadable stream file, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_other_format_versions() {
        let dir = tempdir().unwrap();
        let payload = rmp_serde::to_vec(&StreamMap::new()).unwrap();
        let envelope = PersistedEnvelope {
            format_version: CATALOG_FORMAT_VERSION + 1,
            checksum: checksum_utils::calculate_sha256_checksum(&payload),
            payload,
        };
        fs::write(
            dir.path().join(STREAM_DATA_FILENAME),
            rmp_serde::to_vec(&envelope).unwrap(),
        )
        .unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());

        assert!(matches!(
            persistence.load(),
            Err(PersistenceError::Corrupt {
                file: CatalogFile::Streams,
                ..
            })
        ));
    }

    #[test]
    fn test_load_fails_when_stream_path_cannot_be_read() {
        let dir = tempdir().unwrap();
        // A directory in place of the file exists but cannot be read as a file.
        fs::create_dir(dir.path().join(STREAM_DATA_FILENAME)).unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());

        assert!(matches!(
            persistence.load(),
            Err(PersistenceError::Unreadable {
                file: CatalogFile::Streams,
                ..
            })
        ));
    }

    #[test]
    fn test_save_stops_before_invertebrates_when_stream_write_fails() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(STREAM_DATA_FILENAME)).unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());

        let err = persistence.save(&sample_snapshot()).unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::Write {
                file: CatalogFile::Streams,
                ..
            }
        ));
        assert!(!err.leaves_split_state());
        assert!(!dir.path().join(INVERTEBRATE_DATA_FILENAME).exists());
    }

    #[test]
    fn test_invertebrate_write_failure_leaves_split_state_on_disk() {
        // Known, accepted inconsistency: the stream file is already rewritten when the
        // invertebrate file fails, and nothing rolls it back.
        let dir = tempdir().unwrap();
        let persistence = CoreCatalogPersistence::new(dir.path().to_path_buf());
        let original = sample_snapshot();
        persistence.save(&original).unwrap();

        fs::remove_file(dir.path().join(INVERTEBRATE_DATA_FILENAME)).unwrap();
        fs::create_dir(dir.path().join(INVERTEBRATE_DATA_FILENAME)).unwrap();

        let mut updated = original.clone();
        updated.streams.insert(
            "Browns River".to_string(),
            Stream::new("Browns River", vec!["Mayfly".to_string()]),
        );
        let err = persistence.save(&updated).unwrap_err();
        assert!(err.leaves_split_state());

        fs::remove_dir(dir.path().join(INVERTEBRATE_DATA_FILENAME)).unwrap();
        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.streams, updated.streams);
        assert!(loaded.sync_required);
    }
}
