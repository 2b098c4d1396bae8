//! Suffix map for substring search over filenames.
//!
//! Every case-folded suffix of an indexed filename is a key in an ordered
//! map. A filename contains `term` as a substring iff one of its suffixes
//! starts with `term`, so a substring query becomes a prefix range scan
//! over the keys.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use crate::index::IndexRecord;

/// Iterate the non-empty suffixes of `folded`, longest first.
///
/// Suffixes start on `char` boundaries, so a name with `n` chars yields
/// exactly `n` suffixes.
pub fn suffixes(folded: &str) -> impl Iterator<Item = &str> {
    folded.char_indices().map(move |(start, _)| &folded[start..])
}

/// Case-folded suffix -> records whose filename ends with that suffix.
///
/// Records are shared through `Arc`, so each key only costs a pointer per
/// record rather than a copy of both strings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SuffixIndex {
    entries: BTreeMap<Box<str>, BTreeSet<Arc<IndexRecord>>>,
}

impl SuffixIndex {
    /// Create an empty suffix index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `record` under every suffix of its lowercased filename.
    ///
    /// Returns true if the record was missing from at least one suffix set.
    pub fn insert(&mut self, record: &Arc<IndexRecord>) -> bool {
        let folded = record.filename.to_lowercase();
        let mut added = false;

        for suffix in suffixes(&folded) {
            // Avoid allocating a key when the suffix is already present.
            if let Some(records) = self.entries.get_mut(suffix) {
                added |= records.insert(Arc::clone(record));
            } else {
                self.entries.insert(suffix.into(), BTreeSet::from([Arc::clone(record)]));
                added = true;
            }
        }

        added
    }

    /// Discard `record` from every suffix set of its lowercased filename.
    ///
    /// Sets that become empty are deleted so the key count stays bounded by
    /// the current contents. Returns true if anything was removed.
    pub fn remove(&mut self, record: &IndexRecord) -> bool {
        let folded = record.filename.to_lowercase();
        let mut removed = false;

        for suffix in suffixes(&folded) {
            let Some(records) = self.entries.get_mut(suffix) else {
                continue;
            };
            removed |= records.remove(record);
            if records.is_empty() {
                self.entries.remove(suffix);
            }
        }

        removed
    }

    /// Records whose lowercased filename contains `term`.
    ///
    /// `term` must already be lowercased. Scans the keys in `[term, ..)` and
    /// stops at the first key that no longer starts with `term`.
    #[must_use]
    pub fn prefix_matches(&self, term: &str) -> HashSet<Arc<IndexRecord>> {
        self.entries
            .range::<str, _>((Bound::Included(term), Bound::Unbounded))
            .take_while(|(suffix, _)| suffix.starts_with(term))
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }

    /// Records stored under exactly `suffix`.
    #[must_use]
    pub fn records_for(&self, suffix: &str) -> Vec<IndexRecord> {
        self.entries
            .get(suffix)
            .map(|records| records.iter().map(|r| IndexRecord::clone(r)).collect())
            .unwrap_or_default()
    }

    /// Number of distinct suffix keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All suffix keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(AsRef::as_ref)
    }

    /// Longest suffix key (by char count), ties broken by key order.
    #[must_use]
    pub fn longest_key(&self) -> Option<&str> {
        self.keys().max_by(|a, b| a.chars().count().cmp(&b.chars().count()).then(b.cmp(a)))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
