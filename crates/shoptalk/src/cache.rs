//! Expiring key-value store used for the session map and the intent cache.
//!
//! Eviction is a named, testable policy here rather than scattered timer
//! callbacks: reads lazily drop expired entries, and `sweep()` lets an owner
//! bound growth with a periodic task if it wants one. There is no background
//! sweeper by default; the intent cache is deliberately unbounded between
//! sweeps.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Entry expires a fixed duration after insertion. Reads never extend it.
    FixedTtl(Duration),
    /// Entry expires after an idle window. Every read re-arms the window.
    SlidingIdle(Duration),
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_access: Instant,
}

pub struct ExpiringMap<K: Eq + Hash, V> {
    entries: DashMap<K, Entry<V>>,
    policy: ExpiryPolicy,
}

impl<K: Eq + Hash + Clone, V: Clone> ExpiringMap<K, V> {
    pub fn new(policy: ExpiryPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        match self.policy {
            ExpiryPolicy::FixedTtl(ttl) => now.duration_since(entry.inserted_at) >= ttl,
            ExpiryPolicy::SlidingIdle(idle) => now.duration_since(entry.last_access) >= idle,
        }
    }

    /// Fetch a live value. Expired entries are removed on the way out; under
    /// the sliding policy a hit re-arms the idle window.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if self.is_expired(&entry, now) {
                    true
                } else {
                    entry.last_access = now;
                    return Some(entry.value.clone());
                }
            }
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    /// Read-modify-write on a live entry. Returns false when the key is
    /// absent or expired. The sliding window is re-armed like `get`.
    pub fn update<F: FnOnce(&mut V)>(&self, key: &K, f: F) -> bool {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if self.is_expired(&entry, now) {
                    true
                } else {
                    entry.last_access = now;
                    f(&mut entry.value);
                    return true;
                }
            }
            None => return false,
        };
        if expired {
            self.entries.remove(key);
        }
        false
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| match self.policy {
            ExpiryPolicy::FixedTtl(ttl) => now.duration_since(entry.inserted_at) < ttl,
            ExpiryPolicy::SlidingIdle(idle) => now.duration_since(entry.last_access) < idle,
        });
        before - self.entries.len()
    }

    /// Entry count including not-yet-swept expired entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_fixed_ttl_expires_from_insertion() {
        let map = ExpiringMap::new(ExpiryPolicy::FixedTtl(Duration::from_millis(40)));
        map.insert("k", 1);
        assert_eq!(map.get(&"k"), Some(1));

        // Reads must not extend a fixed TTL
        sleep(Duration::from_millis(25));
        assert_eq!(map.get(&"k"), Some(1));
        sleep(Duration::from_millis(25));
        assert_eq!(map.get(&"k"), None);
    }

    #[test]
    fn test_sliding_idle_rearms_on_access() {
        let map = ExpiringMap::new(ExpiryPolicy::SlidingIdle(Duration::from_millis(50)));
        map.insert("session", 7);

        // Three accesses inside the window keep it alive past the original deadline
        for _ in 0..3 {
            sleep(Duration::from_millis(30));
            assert_eq!(map.get(&"session"), Some(7));
        }

        sleep(Duration::from_millis(60));
        assert_eq!(map.get(&"session"), None);
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let map = ExpiringMap::new(ExpiryPolicy::FixedTtl(Duration::from_millis(10)));
        map.insert("k", 1);
        sleep(Duration::from_millis(20));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"k"), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_sweep_drops_only_expired() {
        let map = ExpiringMap::new(ExpiryPolicy::FixedTtl(Duration::from_millis(30)));
        map.insert("old", 1);
        sleep(Duration::from_millis(40));
        map.insert("fresh", 2);

        assert_eq!(map.sweep(), 1);
        assert_eq!(map.get(&"fresh"), Some(2));
        assert_eq!(map.get(&"old"), None);
    }

    #[test]
    fn test_update_rearms_sliding_window() {
        let map = ExpiringMap::new(ExpiryPolicy::SlidingIdle(Duration::from_millis(50)));
        map.insert("s", vec![1]);
        sleep(Duration::from_millis(30));
        assert!(map.update(&"s", |v| v.push(2)));
        sleep(Duration::from_millis(30));
        assert_eq!(map.get(&"s"), Some(vec![1, 2]));
    }
}
