use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::external::ExternalCache;

/// An immutable cache entry: the rewritten bytes of one sandbox class plus
/// the sandbox names it references (for reachability walks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub bytes: Vec<u8>,
    pub references: BTreeSet<String>,
}

/// Hierarchical bytecode cache, keyed by sandbox internal name.
///
/// Reads consult the external side-channel first (when configured), then the
/// parent chain, then local entries. Writes are local-only: an entry already
/// present anywhere in the chain shadows the insert, so a key resolves to at
/// most one entry for the lifetime of the chain.
pub struct ByteCodeCache {
    parent: Option<Arc<ByteCodeCache>>,
    external: Option<Arc<dyn ExternalCache>>,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl ByteCodeCache {
    pub fn root(external: Option<Arc<dyn ExternalCache>>) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            external,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// A fresh empty cache chained under `self`.
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            external: None,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<CacheEntry>> {
        if let Some(external) = &self.external {
            if let Some(found) = external.load(name) {
                tracing::debug!(
                    target = "vesta.cache",
                    name,
                    bytes = found.bytes.len(),
                    "external cache hit"
                );
                let entry = Arc::new(CacheEntry {
                    name: name.to_string(),
                    bytes: found.bytes,
                    references: found.references,
                });
                self.entries
                    .write()
                    .expect("cache lock poisoned")
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&entry));
                return Some(entry);
            }
        }
        if let Some(parent) = &self.parent {
            if let Some(entry) = parent.get(name) {
                return Some(entry);
            }
        }
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(name)
            .cloned()
    }

    /// Publish an entry. Entries already visible under the same key win;
    /// otherwise the entry is stored locally and mirrored to the external
    /// cache when one is configured.
    pub fn put_if_absent(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        if let Some(existing) = self.get(&entry.name) {
            return existing;
        }
        let entry = Arc::new(entry);
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let winner = entries
            .entry(entry.name.clone())
            .or_insert_with(|| Arc::clone(&entry))
            .clone();
        drop(entries);
        if Arc::ptr_eq(&winner, &entry) {
            if let Some(external) = &self.external {
                external.store(&winner);
            }
        }
        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, byte: u8) -> CacheEntry {
        CacheEntry {
            name: name.to_string(),
            bytes: vec![byte],
            references: BTreeSet::new(),
        }
    }

    #[test]
    fn get_after_put_returns_the_same_bytes() {
        let cache = ByteCodeCache::root(None);
        cache.put_if_absent(entry("sandbox/a/B", 1));
        assert_eq!(cache.get("sandbox/a/B").unwrap().bytes, vec![1]);
    }

    #[test]
    fn child_reads_parent_entries() {
        let parent = ByteCodeCache::root(None);
        parent.put_if_absent(entry("sandbox/a/B", 1));
        let child = parent.child();
        assert_eq!(child.get("sandbox/a/B").unwrap().bytes, vec![1]);
    }

    #[test]
    fn parent_entries_shadow_child_inserts() {
        let parent = ByteCodeCache::root(None);
        parent.put_if_absent(entry("sandbox/a/B", 1));
        let child = parent.child();
        let winner = child.put_if_absent(entry("sandbox/a/B", 2));
        assert_eq!(winner.bytes, vec![1]);
        assert_eq!(child.get("sandbox/a/B").unwrap().bytes, vec![1]);
    }

    #[test]
    fn child_writes_never_reach_the_parent() {
        let parent = ByteCodeCache::root(None);
        let child = parent.child();
        child.put_if_absent(entry("sandbox/a/B", 2));
        assert!(parent.get("sandbox/a/B").is_none());
        assert_eq!(child.get("sandbox/a/B").unwrap().bytes, vec![2]);
    }
}
