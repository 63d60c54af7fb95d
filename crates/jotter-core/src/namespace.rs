//! Shared namespace for one notebook session.
//!
//! Holds the last published value for every top-level binding any cell has
//! exported. The store is passed explicitly to the execution host and the
//! sandbox renderer, so two sessions never see each other's bindings.
//!
//! Writes follow last-writer-wins: whichever execution merges last owns the
//! name, regardless of where its cell sits in the notebook. A merge applies
//! the full batch of one module's exports under a single write lock, so a
//! reader never observes half of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rquickjs::{Persistent, Value};
use rustc_hash::FxHashMap;

/// Namespace holding live JavaScript values.
pub type JsValueStore = SharedNamespace<Persistent<Value<'static>>>;

/// Session-scoped name → value store.
pub struct SharedNamespace<V> {
    entries: RwLock<FxHashMap<String, V>>,
    /// Incremented once per applied write.
    revision: AtomicU64,
}

impl<V> Default for SharedNamespace<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SharedNamespace<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            revision: AtomicU64::new(0),
        }
    }

    /// Publish a single name.
    pub fn set(&self, name: impl Into<String>, value: V) {
        let mut entries = self.entries.write();
        entries.insert(name.into(), value);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Apply a batch of publications atomically.
    ///
    /// Later entries in the batch win over earlier ones with the same name.
    /// Returns the number of entries applied.
    pub fn merge<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let batch: Vec<(String, V)> = batch.into_iter().collect();
        if batch.is_empty() {
            return 0;
        }
        let count = batch.len();
        let mut entries = self.entries.write();
        entries.extend(batch);
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("Merged {} namespace entries", count);
        count
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Published names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every binding (session reset).
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of writes applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl<V: Clone> SharedNamespace<V> {
    pub fn get(&self, name: &str) -> Option<V> {
        self.entries.read().get(name).cloned()
    }

    /// Consistent copy of every entry, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, V)> {
        let mut entries: Vec<(String, V)> = self
            .entries
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_get() {
        let ns = SharedNamespace::new();
        ns.set("a", 3);
        assert_eq!(ns.get("a"), Some(3));
        assert_eq!(ns.get("b"), None);
        assert!(ns.contains("a"));
    }

    #[test]
    fn test_last_writer_wins() {
        let ns = SharedNamespace::new();
        ns.merge(vec![("x".to_string(), 1), ("y".to_string(), 2)]);
        ns.merge(vec![("x".to_string(), 10)]);
        assert_eq!(ns.get("x"), Some(10));
        assert_eq!(ns.get("y"), Some(2));
        assert_eq!(ns.names(), vec!["x", "y"]);
    }

    #[test]
    fn test_merge_bumps_revision_once() {
        let ns = SharedNamespace::new();
        assert_eq!(ns.revision(), 0);
        let applied = ns.merge((0..5).map(|i| (format!("n{i}"), i)));
        assert_eq!(applied, 5);
        assert_eq!(ns.revision(), 1);
    }

    #[test]
    fn test_empty_merge_is_noop() {
        let ns: SharedNamespace<i32> = SharedNamespace::new();
        assert_eq!(ns.merge(Vec::new()), 0);
        assert_eq!(ns.revision(), 0);
    }

    #[test]
    fn test_clear() {
        let ns = SharedNamespace::new();
        ns.set("a", 1);
        ns.clear();
        assert!(ns.is_empty());
        assert_eq!(ns.len(), 0);
    }

    #[test]
    fn test_snapshot_sorted() {
        let ns = SharedNamespace::new();
        ns.set("b", 2);
        ns.set("a", 1);
        assert_eq!(
            ns.snapshot(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_concurrent_batches_are_never_interleaved() {
        let ns = Arc::new(SharedNamespace::new());
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let ns = Arc::clone(&ns);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        ns.merge((0..8).map(|slot| (format!("k{slot}"), writer)));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = ns.snapshot();
            if let Some((_, first)) = snapshot.first() {
                assert!(snapshot.iter().all(|(_, value)| value == first));
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }
}
