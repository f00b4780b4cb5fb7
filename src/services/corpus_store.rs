// Corpus Store
// In-memory collection of historical talks with duplicate suppression

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::models::CorpusEntry;

/// Holds accepted talks in insertion order.
///
/// Entries are deduplicated on (lower-cased title, url). Entries are shared
/// via `Arc` so search results can point at them without cloning.
#[derive(Debug, Default)]
pub struct CorpusStore {
    entries: Vec<Arc<CorpusEntry>>,
    keys: HashSet<(String, Option<String>)>,
}

impl CorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns false when an equivalent entry already exists.
    pub fn add_entry(&mut self, entry: CorpusEntry) -> bool {
        let key = entry.dedup_key();
        if self.keys.contains(&key) {
            debug!("[CORPUS] Skipping duplicate entry: {}", entry.title);
            return false;
        }
        self.keys.insert(key);
        self.entries.push(Arc::new(entry));
        true
    }

    /// Insert many entries, returning how many were actually stored
    pub fn add_entries(&mut self, entries: impl IntoIterator<Item = CorpusEntry>) -> usize {
        entries
            .into_iter()
            .map(|e| self.add_entry(e))
            .filter(|added| *added)
            .count()
    }

    /// Snapshot of the current entries; later writes do not affect it
    pub fn all_entries(&self) -> Vec<Arc<CorpusEntry>> {
        self.entries.clone()
    }

    pub fn entries_by_source(&self, source: &str) -> Vec<Arc<CorpusEntry>> {
        self.entries
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    /// Entries whose conference name contains `needle`, case-insensitively
    pub fn entries_by_conference_substring(&self, needle: &str) -> Vec<Arc<CorpusEntry>> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.conference
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Case-insensitive substring match on title, abstract or description.
    /// Each field is matched on its own.
    pub fn search(&self, query: &str) -> Vec<Arc<CorpusEntry>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| {
                [
                    Some(e.title.as_str()),
                    e.abstract_text.as_deref(),
                    e.description.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }
}
