//! The shared filename index.
//!
//! Three structures are kept in lockstep behind one `RwLock`:
//!
//! - **suffixes**: lowercased suffix -> records ([`SuffixIndex`])
//! - **names**: filename -> full paths carrying that name
//! - **paths**: full path -> filenames indexed for it
//!
//! `paths` is what makes [`Index::remove`] symmetric with
//! [`Index::insert`]: the filename needed to find the suffix keys is looked
//! up instead of being re-derived from a path that may already be gone.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::suffix::SuffixIndex;

/// One indexed filesystem entry.
///
/// Ordering is by full path first so sorted output groups by location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IndexRecord {
    #[serde(rename = "path")]
    pub full_path: String,
    pub filename: String,
}

impl IndexRecord {
    pub fn new(filename: impl Into<String>, full_path: impl Into<String>) -> Self {
        Self { full_path: full_path.into(), filename: filename.into() }
    }
}

/// Summary counters for an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Total `(filename, path)` records
    pub records: usize,
    /// Distinct filenames
    pub unique_names: usize,
    /// Distinct full paths
    pub paths: usize,
    /// Distinct suffix keys
    pub suffix_keys: usize,
    /// Longest suffix key, i.e. the longest lowercased filename
    pub longest_suffix: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct IndexState {
    suffixes: SuffixIndex,
    names: HashMap<String, BTreeSet<String>>,
    paths: HashMap<String, BTreeSet<String>>,
    records: usize,
}

impl IndexState {
    fn insert(&mut self, filename: &str, path: &str) -> bool {
        if self.paths.get(path).is_some_and(|names| names.contains(filename)) {
            return false;
        }

        let record = Arc::new(IndexRecord::new(filename, path));
        self.suffixes.insert(&record);
        self.names.entry(filename.to_string()).or_default().insert(path.to_string());
        self.paths.entry(path.to_string()).or_default().insert(filename.to_string());
        self.records += 1;
        true
    }

    fn remove(&mut self, path: &str) -> usize {
        let Some(filenames) = self.paths.remove(path) else {
            return 0;
        };

        for filename in &filenames {
            self.suffixes.remove(&IndexRecord::new(filename.as_str(), path));

            if let Some(paths) = self.names.get_mut(filename.as_str()) {
                paths.remove(path);
                if paths.is_empty() {
                    self.names.remove(filename.as_str());
                }
            }
        }

        self.records -= filenames.len();
        filenames.len()
    }
}

/// Thread-safe filename index.
///
/// Every mutation takes the write lock for its whole duration, so readers
/// never see a record present in one structure but not yet in another.
/// Share it between builder, updater and searchers with `Arc<Index>`.
#[derive(Debug, Default)]
pub struct Index {
    state: RwLock<IndexState>,
}

impl Index {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(filename, path)` pairs.
    pub fn from_records<I, F, P>(records: I) -> Self
    where
        I: IntoIterator<Item = (F, P)>,
        F: AsRef<str>,
        P: AsRef<str>,
    {
        let index = Self::new();
        {
            let mut state = index.state.write();
            for (filename, path) in records {
                state.insert(filename.as_ref(), path.as_ref());
            }
        }
        index
    }

    /// Index `filename` at `path`.
    ///
    /// Re-inserting an existing record is a no-op. Returns true if the
    /// record was newly added.
    pub fn insert(&self, filename: &str, path: &str) -> bool {
        self.state.write().insert(filename, path)
    }

    /// Remove every record for `path`.
    ///
    /// Removing a path that was never indexed is a no-op, since event
    /// sources may deliver stale or duplicate deletions. Returns the number
    /// of records removed.
    pub fn remove(&self, path: &str) -> usize {
        self.state.write().remove(path)
    }

    /// Move `old_path` to `new_path` under `new_filename`.
    ///
    /// Both halves happen under one write lock, so a concurrent search sees
    /// either the old record or the new one, never both or neither.
    pub fn rename(&self, old_path: &str, new_filename: &str, new_path: &str) -> bool {
        let mut state = self.state.write();
        state.remove(old_path);
        state.insert(new_filename, new_path)
    }

    /// Drop every record.
    pub fn clear(&self) {
        *self.state.write() = IndexState::default();
    }

    /// Run `f` against the suffix map while holding the read lock.
    ///
    /// Keep `f` short; writers wait for it.
    pub(crate) fn with_suffixes<R>(&self, f: impl FnOnce(&SuffixIndex) -> R) -> R {
        f(&self.state.read().suffixes)
    }

    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.state.read().paths.contains_key(path)
    }

    /// Full paths currently carrying exactly `filename`, sorted.
    #[must_use]
    pub fn paths_for_name(&self, filename: &str) -> Vec<String> {
        self.state
            .read()
            .names
            .get(filename)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Filenames indexed for `path`, sorted. Normally zero or one.
    #[must_use]
    pub fn names_for_path(&self, path: &str) -> Vec<String> {
        self.state
            .read()
            .paths
            .get(path)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records stored under exactly `suffix` (already lowercased).
    #[must_use]
    pub fn records_for_suffix(&self, suffix: &str) -> Vec<IndexRecord> {
        self.state.read().suffixes.records_for(suffix)
    }

    /// Every suffix key, ascending.
    #[must_use]
    pub fn suffix_keys(&self) -> Vec<String> {
        self.state.read().suffixes.keys().map(str::to_string).collect()
    }

    /// Every record, sorted by full path then filename.
    #[must_use]
    pub fn records(&self) -> Vec<IndexRecord> {
        let state = self.state.read();
        let mut records: Vec<IndexRecord> = state
            .paths
            .iter()
            .flat_map(|(path, names)| {
                names.iter().map(move |name| IndexRecord::new(name.as_str(), path.as_str()))
            })
            .collect();
        drop(state);
        records.sort_unstable();
        records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            records: state.records,
            unique_names: state.names.len(),
            paths: state.paths.len(),
            suffix_keys: state.suffixes.len(),
            longest_suffix: state.suffixes.longest_key().map(str::to_string),
        }
    }
}
