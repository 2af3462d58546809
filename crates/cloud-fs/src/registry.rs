//! Tracks which files currently hold fetched content.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Ordered set of hydrated file paths with their hydration timestamps.
///
/// Order is hydration order, oldest first. The lock is only held for the
/// duration of a single call; callers never fetch while holding it.
#[derive(Debug, Default)]
pub struct HydrationRegistry {
    entries: Mutex<IndexMap<String, DateTime<Utc>>>,
}

impl HydrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` was hydrated at `at`.
    ///
    /// Re-recording a path moves it to the newest position.
    pub fn record(&self, path: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        entries.shift_remove(path);
        entries.insert(path.to_string(), at);
    }

    /// Forget `path`, returning its hydration timestamp if it was tracked.
    pub fn remove(&self, path: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().shift_remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    pub fn hydrated_at(&self, path: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Tracked paths, oldest hydration first.
    pub fn paths(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Swap the live set for an empty one and return the old content.
    ///
    /// Hydrations recorded after this call land in the fresh set.
    pub fn take_snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        let taken = std::mem::take(&mut *self.entries.lock());
        taken.into_iter().collect()
    }

    /// Put retained snapshot entries back into the live set.
    ///
    /// A path recorded again while the snapshot was out keeps its newer
    /// timestamp. Restored entries are placed before newer records so the
    /// set stays ordered by hydration time.
    pub fn restore(&self, retained: Vec<(String, DateTime<Utc>)>) {
        if retained.is_empty() {
            return;
        }

        let mut entries = self.entries.lock();
        let newer = std::mem::take(&mut *entries);
        for (path, at) in retained {
            if !newer.contains_key(&path) {
                entries.insert(path, at);
            }
        }
        for (path, at) in newer {
            entries.insert(path, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_and_query() {
        let registry = HydrationRegistry::new();
        let t0 = Utc::now();

        registry.record("/a", t0);
        registry.record("/b", t0 + Duration::seconds(1));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("/a"));
        assert_eq!(registry.hydrated_at("/b"), Some(t0 + Duration::seconds(1)));
        assert_eq!(registry.paths(), vec!["/a", "/b"]);
    }

    #[test]
    fn test_rerecord_moves_to_newest() {
        let registry = HydrationRegistry::new();
        let t0 = Utc::now();

        registry.record("/a", t0);
        registry.record("/b", t0);
        registry.record("/a", t0 + Duration::seconds(5));

        assert_eq!(registry.paths(), vec!["/b", "/a"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_snapshot_clears_live_set() {
        let registry = HydrationRegistry::new();
        let t0 = Utc::now();
        registry.record("/a", t0);

        let snapshot = registry.take_snapshot();
        assert_eq!(snapshot, vec![("/a".to_string(), t0)]);
        assert!(registry.is_empty());

        registry.record("/c", t0);
        assert_eq!(registry.paths(), vec!["/c"]);
    }

    #[test]
    fn test_restore_keeps_newer_records() {
        let registry = HydrationRegistry::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(1);

        registry.record("/a", t0);
        registry.record("/b", t0);
        let snapshot = registry.take_snapshot();

        // "/b" hydrated again while the sweep was running
        registry.record("/b", t1);
        registry.record("/c", t1);
        registry.restore(snapshot);

        assert_eq!(registry.paths(), vec!["/a", "/b", "/c"]);
        assert_eq!(registry.hydrated_at("/b"), Some(t1));
    }

    #[test]
    fn test_remove() {
        let registry = HydrationRegistry::new();
        let t0 = Utc::now();
        registry.record("/a", t0);

        assert_eq!(registry.remove("/a"), Some(t0));
        assert_eq!(registry.remove("/a"), None);
        assert!(registry.is_empty());
    }
}
