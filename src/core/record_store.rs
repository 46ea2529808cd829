/*
 * This module defines the RecordStore, the in-memory catalog shared between the
 * interactive thread and the background synchronizer. Both collections (streams
 * and invertebrates) live behind a single mutex because streams reference
 * invertebrates by name: a reader must never observe one map updated and the
 * other not.
 *
 * Every method holds the lock only long enough to copy data in or out. Sorting,
 * file I/O and remote calls always happen after the guard is dropped.
 */
use super::models::{CatalogSnapshot, Invertebrate, InvertebrateMap, Stream, StreamMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Catalog {
    streams: StreamMap,
    invertebrates: InvertebrateMap,
}

#[derive(Debug, Default)]
pub struct RecordStore {
    catalog: Mutex<Catalog>,
}

impl RecordStore {
    pub fn new() -> Self {
        log::debug!("RecordStore::new called - creating empty catalog.");
        RecordStore {
            catalog: Mutex::new(Catalog::default()),
        }
    }

    /*
     * The maps stay structurally valid even if a holder of the lock panicked, so a
     * poisoned lock is recovered rather than propagated.
     */
    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /*
     * Returns the titles of all streams with a non-empty title, sorted
     * lexicographically. The sort runs after the lock is released.
     */
    pub fn stream_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = {
            let catalog = self.lock();
            catalog
                .streams
                .values()
                .filter(|stream| !stream.title.is_empty())
                .map(|stream| stream.title.clone())
                .collect()
        };
        titles.sort();
        titles
    }

    /*
     * Resolves the invertebrates listed by the stream `title`, sorted by their
     * natural order. Unknown streams yield an empty list. Names that do not
     * resolve, and records with an empty name, are skipped.
     */
    pub fn invertebrates_for_stream(&self, title: &str) -> Vec<Invertebrate> {
        let mut resolved: Vec<Invertebrate> = {
            let catalog = self.lock();
            let Some(stream) = catalog.streams.get(title) else {
                log::trace!("RecordStore: No stream titled '{title}'.");
                return Vec::new();
            };
            stream
                .invertebrate_names
                .iter()
                .filter_map(|name| catalog.invertebrates.get(name))
                .filter(|invertebrate| !invertebrate.name.is_empty())
                .cloned()
                .collect()
        };
        resolved.sort();
        resolved
    }

    pub fn invertebrate(&self, name: &str) -> Option<Invertebrate> {
        self.lock().invertebrates.get(name).cloned()
    }

    pub fn stream(&self, title: &str) -> Option<Stream> {
        self.lock().streams.get(title).cloned()
    }

    pub fn merge_streams(&self, batch: StreamMap) {
        let mut catalog = self.lock();
        log::trace!("RecordStore: Merging {} stream(s).", batch.len());
        catalog.streams.extend(batch);
    }

    pub fn merge_invertebrates(&self, batch: InvertebrateMap) {
        let mut catalog = self.lock();
        log::trace!("RecordStore: Merging {} invertebrate(s).", batch.len());
        catalog.invertebrates.extend(batch);
    }

    /*
     * Applies one synchronizer unit. Invertebrates and streams are merged under the
     * same guard so readers see either none or all of the unit.
     */
    pub fn merge_unit(&self, streams: StreamMap, invertebrates: InvertebrateMap) {
        let mut catalog = self.lock();
        log::trace!(
            "RecordStore: Merging unit with {} stream(s) and {} invertebrate(s).",
            streams.len(),
            invertebrates.len()
        );
        catalog.invertebrates.extend(invertebrates);
        catalog.streams.extend(streams);
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        let catalog = self.lock();
        CatalogSnapshot {
            streams: catalog.streams.clone(),
            invertebrates: catalog.invertebrates.clone(),
        }
    }

    // An empty store means no streams, which is what makes a sync mandatory.
    pub fn is_empty(&self) -> bool {
        self.lock().streams.is_empty()
    }

    // (streams, invertebrates)
    pub fn counts(&self) -> (usize, usize) {
        let catalog = self.lock();
        (catalog.streams.len(), catalog.invertebrates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn stream(title: &str, names: &[&str]) -> (String, Stream) {
        (
            title.to_string(),
            Stream::new(title, names.iter().map(|n| n.to_string()).collect()),
        )
    }

    fn invertebrate(name: &str) -> (String, Invertebrate) {
        (name.to_string(), Invertebrate::new(name))
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = RecordStore::new();
        assert!(store.is_empty());
        assert_eq!(store.counts(), (0, 0));
        assert!(store.stream_titles().is_empty());
        assert!(store.invertebrate("Mayfly").is_none());
    }

    #[test]
    fn test_stream_titles_are_sorted_and_skip_empty_titles() {
        let store = RecordStore::new();
        store.merge_streams(HashMap::from([
            stream("Otter Creek", &[]),
            stream("Browns River", &[]),
            (String::from("untitled"), Stream::new("", vec![])),
            stream("Lewis Creek", &[]),
        ]));

        assert_eq!(
            store.stream_titles(),
            vec!["Browns River", "Lewis Creek", "Otter Creek"]
        );
    }

    #[test]
    fn test_dangling_names_are_skipped() {
        let store = RecordStore::new();
        store.merge_streams(HashMap::from([stream("Creek A", &["Bug1", "Bug2"])]));
        store.merge_invertebrates(HashMap::from([invertebrate("Bug1")]));

        assert_eq!(
            store.invertebrates_for_stream("Creek A"),
            vec![Invertebrate::new("Bug1")]
        );
    }

    #[test]
    fn test_invertebrates_for_stream_sorted_and_skips_nameless_records() {
        let store = RecordStore::new();
        store.merge_streams(HashMap::from([stream(
            "Creek B",
            &["Stonefly", "blank", "Caddisfly", "Mayfly"],
        )]));
        store.merge_invertebrates(HashMap::from([
            invertebrate("Stonefly"),
            invertebrate("Caddisfly"),
            invertebrate("Mayfly"),
            (String::from("blank"), Invertebrate::new("")),
        ]));

        let names: Vec<String> = store
            .invertebrates_for_stream("Creek B")
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Caddisfly", "Mayfly", "Stonefly"]);
    }

    #[test]
    fn test_unknown_stream_yields_empty_list() {
        let store = RecordStore::new();
        store.merge_invertebrates(HashMap::from([invertebrate("Mayfly")]));
        assert!(store.invertebrates_for_stream("Nowhere").is_empty());
    }

    #[test]
    fn test_merge_overwrites_existing_keys() {
        let store = RecordStore::new();
        store.merge_streams(HashMap::from([stream("Creek", &["A"])]));
        store.merge_invertebrates(HashMap::from([(
            "A".to_string(),
            Invertebrate::new("A").with_attribute("tolerance", "3"),
        )]));

        store.merge_streams(HashMap::from([stream("Creek", &["A", "B"])]));
        store.merge_invertebrates(HashMap::from([(
            "A".to_string(),
            Invertebrate::new("A").with_attribute("tolerance", "5"),
        )]));

        assert_eq!(store.counts(), (1, 1));
        assert_eq!(
            store.stream("Creek").unwrap().invertebrate_names,
            vec!["A", "B"]
        );
        assert_eq!(
            store.invertebrate("A").unwrap().attributes.get("tolerance"),
            Some(&"5".to_string())
        );
    }

    #[test]
    fn test_sequence_of_merges_equals_keywise_fold() {
        let batches: Vec<Vec<(&str, &str)>> = vec![
            vec![("a", "1"), ("b", "1")],
            vec![("b", "2"), ("c", "2")],
            vec![("a", "3")],
            vec![],
            vec![("d", "4"), ("c", "4")],
        ];

        let store = RecordStore::new();
        let mut expected: HashMap<String, Invertebrate> = HashMap::new();
        for batch in &batches {
            let batch: InvertebrateMap = batch
                .iter()
                .map(|(name, version)| {
                    (
                        name.to_string(),
                        Invertebrate::new(*name).with_attribute("version", *version),
                    )
                })
                .collect();
            for (key, value) in &batch {
                expected.insert(key.clone(), value.clone());
            }
            store.merge_invertebrates(batch);
        }

        assert_eq!(store.snapshot().invertebrates, expected);
    }

    /*
     * Spawns a reader that checks `check` against snapshots until `done` is set.
     * It takes at least one snapshot after passing `ready`, however late it is
     * scheduled.
     */
    fn spawn_checking_reader(
        store: &Arc<RecordStore>,
        ready: &Arc<Barrier>,
        done: &Arc<AtomicBool>,
        check: fn(&CatalogSnapshot),
    ) -> thread::JoinHandle<usize> {
        let store = Arc::clone(store);
        let ready = Arc::clone(ready);
        let done = Arc::clone(done);
        thread::spawn(move || {
            ready.wait();
            let mut observations = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                check(&store.snapshot());
                observations += 1;
                if finished {
                    return observations;
                }
            }
        })
    }

    fn unit_names(i: usize) -> (String, String) {
        (format!("S{i}"), format!("I{i}"))
    }

    #[test]
    fn test_concurrent_readers_never_observe_half_applied_units() {
        // Each unit adds stream "S{i}" referencing "I{i}". A reader that sees the
        // stream must also see the invertebrate it references.
        let store = Arc::new(RecordStore::new());
        let ready = Arc::new(Barrier::new(2));
        let done = Arc::new(AtomicBool::new(false));
        let reader = spawn_checking_reader(&store, &ready, &done, |snapshot| {
            for stream in snapshot.streams.values() {
                for name in &stream.invertebrate_names {
                    assert!(
                        snapshot.invertebrates.contains_key(name),
                        "Torn read: stream {} references missing {}",
                        stream.title,
                        name
                    );
                }
            }
        });

        ready.wait();
        for i in 0..500 {
            let (title, name) = unit_names(i);
            store.merge_unit(
                HashMap::from([(title.clone(), Stream::new(title, vec![name.clone()]))]),
                HashMap::from([(name.clone(), Invertebrate::new(name))]),
            );
        }
        done.store(true, Ordering::SeqCst);

        let observations = reader.join().expect("reader thread panicked");
        assert!(observations > 0);
        assert_eq!(store.counts(), (500, 500));
    }

    #[test]
    fn test_separate_merges_are_each_applied_whole() {
        // Streams are merged before their invertebrates, so every state in the
        // sequence has at most one dangling stream: the one merged last.
        let store = Arc::new(RecordStore::new());
        let ready = Arc::new(Barrier::new(2));
        let done = Arc::new(AtomicBool::new(false));
        let reader = spawn_checking_reader(&store, &ready, &done, |snapshot| {
            let streams = snapshot.streams.len();
            let invertebrates = snapshot.invertebrates.len();
            assert!(
                streams == invertebrates || streams == invertebrates + 1,
                "Observed {streams} stream(s) with {invertebrates} invertebrate(s)"
            );
            let dangling = snapshot
                .streams
                .values()
                .flat_map(|stream| &stream.invertebrate_names)
                .filter(|name| !snapshot.invertebrates.contains_key(*name))
                .count();
            assert_eq!(dangling, streams - invertebrates);
        });

        ready.wait();
        for i in 0..500 {
            let (title, name) = unit_names(i);
            store.merge_streams(HashMap::from([(
                title.clone(),
                Stream::new(title, vec![name.clone()]),
            )]));
            store.merge_invertebrates(HashMap::from([(name.clone(), Invertebrate::new(name))]));
        }
        done.store(true, Ordering::SeqCst);

        let observations = reader.join().expect("reader thread panicked");
        assert!(observations > 0);
        assert_eq!(store.counts(), (500, 500));
        assert_eq!(store.invertebrates_for_stream("S499"), vec![Invertebrate::new("I499")]);
    }
}
