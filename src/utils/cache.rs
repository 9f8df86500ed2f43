use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::Notify;

/// Insertion-ordered TTL cache.
///
/// `get` evicts an expired entry on access. When the map grows past
/// `max_entries`, the oldest half (by insertion order) is dropped in one
/// sweep. Not thread-safe on its own; callers wrap it in a mutex.
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    entries: FxHashMap<K, (V, Instant)>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(2),
            entries: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                self.entries.remove(key);
                None
            },
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), (value, Instant::now() + self.ttl)).is_none() {
            self.order.push_back(key);
        }

        if self.entries.len() > self.max_entries {
            // Drop the oldest half in one sweep.
            let drop_count = self.max_entries / 2;
            let mut dropped = 0;
            while dropped < drop_count {
                match self.order.pop_front() {
                    Some(old) => {
                        if self.entries.remove(&old).is_some() {
                            dropped += 1;
                        }
                    },
                    None => break,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-flight call coalescing keyed by string (pair contract).
///
/// The first caller for a key becomes the leader and performs the fetch; a
/// concurrent caller for the same key waits for the leader to finish and
/// then re-reads the shared cache. Waiters time-box their wait so a missed
/// wakeup degrades to a retry, never a hang.
#[derive(Default)]
pub struct FlightGroup {
    inflight: std::sync::Mutex<FxHashMap<String, Arc<Notify>>>,
}

pub enum FlightRole {
    Leader(FlightGuard),
    Follower(Arc<Notify>),
}

/// Leader handle; finishing (or dropping) wakes all followers.
pub struct FlightGuard {
    group: Arc<FlightGroup>,
    key: String,
}

impl FlightGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin(self: &Arc<Self>, key: &str) -> FlightRole {
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(notify) = inflight.get(key) {
            FlightRole::Follower(notify.clone())
        } else {
            inflight.insert(key.to_string(), Arc::new(Notify::new()));
            FlightRole::Leader(FlightGuard {
                group: self.clone(),
                key: key.to_string(),
            })
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let notify = self.group.inflight.lock().unwrap().remove(&self.key);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

impl FlightRole {
    /// Follower wait, bounded so a lost notification cannot stall a caller.
    pub async fn wait(notify: Arc<Notify>) {
        let _ = tokio::time::timeout(Duration::from_millis(200), notify.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_evicts_expired_entries() {
        let mut cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(0), 8);
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_half() {
        let mut cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 4);
        for i in 0..5 {
            cache.insert(i, i);
        }
        // 0 and 1 were the oldest entries.
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&4), Some(4));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn reinsert_refreshes_value() {
        let mut cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60), 8);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn second_flight_becomes_follower() {
        let group = FlightGroup::new();
        let leader = group.begin("pair");
        let follower = group.begin("pair");

        assert!(matches!(leader, FlightRole::Leader(_)));
        assert!(matches!(follower, FlightRole::Follower(_)));

        drop(leader);
        // Leader released; the key is free again.
        assert!(matches!(group.begin("pair"), FlightRole::Leader(_)));
    }
}
