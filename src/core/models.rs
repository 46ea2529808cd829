/*
 * Defines the catalog records shared by every layer of the application: a `Stream`
 * (a named sampling site listing the invertebrates found there) and an
 * `Invertebrate` (a uniquely named record with opaque descriptive attributes).
 * Both derive Serialize/Deserialize so the persistence codec and the remote
 * catalog source can read and write them without bespoke conversion code.
 */
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub type StreamMap = HashMap<String, Stream>;
pub type InvertebrateMap = HashMap<String, Invertebrate>;

/*
 * A named grouping of invertebrates. `invertebrate_names` keeps the order in which
 * the catalog lists the records; the names are references into the invertebrate
 * collection and may dangle while a sync is in progress.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub title: String,
    pub invertebrate_names: Vec<String>,
}

impl Stream {
    pub fn new(title: impl Into<String>, invertebrate_names: Vec<String>) -> Self {
        Stream {
            title: title.into(),
            invertebrate_names,
        }
    }
}

/*
 * A catalog record keyed by `name`. The attributes (description, taxonomy,
 * tolerance values, image references, ...) are opaque to the core, which only
 * stores, copies and orders them.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invertebrate {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
impl Invertebrate {
    pub fn new(name: impl Into<String>) -> Self {
        Invertebrate {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

// Display order is by name. Attributes only break ties so Ord stays consistent with Eq.
impl Ord for Invertebrate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.attributes.cmp(&other.attributes))
    }
}

impl PartialOrd for Invertebrate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/*
 * A consistent copy of both collections, taken under a single acquisition of the
 * record store lock. Used to hand data to the persistence codec without holding
 * the lock during file I/O.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub streams: StreamMap,
    pub invertebrates: InvertebrateMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invertebrates_sort_by_name() {
        let mut list = vec![
            Invertebrate::new("Stonefly"),
            Invertebrate::new("Caddisfly").with_attribute("order", "Trichoptera"),
            Invertebrate::new("Mayfly"),
        ];
        list.sort();
        let names: Vec<&str> = list.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Caddisfly", "Mayfly", "Stonefly"]);
    }

    #[test]
    fn test_ordering_is_consistent_with_equality() {
        let plain = Invertebrate::new("Mayfly");
        let described = Invertebrate::new("Mayfly").with_attribute("tolerance", "2");
        assert_ne!(plain, described);
        assert_ne!(plain.cmp(&described), Ordering::Equal);
        assert_eq!(plain.cmp(&plain.clone()), Ordering::Equal);
    }

    #[test]
    fn test_attributes_default_when_missing_from_json() {
        let parsed: Invertebrate = serde_json::from_str(r#"{"name":"Midge"}"#).unwrap();
        assert_eq!(parsed, Invertebrate::new("Midge"));
    }
}
