//! A weight-bounded cache whose concurrent misses share one load.
//!
//! Each key moves through `Unloaded → Loading → {Present | Absent}`. The
//! first caller to miss a key installs a slot and runs the loader outside of
//! the cache lock; callers arriving while the slot is loading block on the
//! same slot and observe the same outcome. Present values stay cached until
//! evicted by weight or invalidated. Absent values and load errors are
//! dropped as soon as the load settles, so a later write becomes visible on
//! the next lookup.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

/// Result of a cache lookup that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<V> {
    Present(V),
    Absent,
}

impl<V> Lookup<V> {
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl<V> From<Option<V>> for Lookup<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}

/// Counters for one cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by a resolved entry or an in-flight load.
    pub hits: u64,
    /// Lookups that installed a new slot.
    pub misses: u64,
    /// Loader invocations.
    pub loads: u64,
    /// Entries dropped to stay within the weight budget.
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub weight: u64,
}

type Weigher<K, V> = Box<dyn Fn(&K, &V) -> u64 + Send + Sync>;

struct Slot<V, E> {
    cell: OnceLock<Result<Lookup<V>, E>>,
}

impl<V, E> Slot<V, E> {
    fn loading() -> Arc<Self> {
        Arc::new(Self {
            cell: OnceLock::new(),
        })
    }

    fn resolved(value: V) -> Arc<Self> {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(Lookup::Present(value)));
        Arc::new(Self { cell })
    }
}

struct Entry<V, E> {
    slot: Arc<Slot<V, E>>,
    /// Recency tick; `None` while loading.
    tick: Option<u64>,
    weight: u64,
}

struct Inner<K, V, E> {
    entries: HashMap<K, Entry<V, E>>,
    /// Resolved entries by last access, oldest first.
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    total_weight: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V, E> Inner<K, V, E> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn touch(&mut self, key: &K) {
        let tick = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            if let Some(old) = entry.tick.replace(tick) {
                self.recency.remove(&old);
            }
            self.recency.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                if let Some(tick) = entry.tick {
                    self.recency.remove(&tick);
                    self.total_weight -= entry.weight;
                }
                true
            }
            None => false,
        }
    }

    fn evict_over(&mut self, max_weight: u64, name: &str) {
        while self.total_weight > max_weight {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_weight -= entry.weight;
                self.stats.evictions += 1;
            }
            debug!(cache = name, weight = self.total_weight, "evicted least recently used entry");
        }
    }
}

/// Single-flight, weight-bounded cache.
///
/// The weigher decides what the budget measures: bytes for content, `1` per
/// entry for small handles.
pub struct SingleFlightCache<K, V, E> {
    name: &'static str,
    max_weight: u64,
    weigher: Weigher<K, V>,
    inner: Mutex<Inner<K, V, E>>,
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new<W>(name: &'static str, max_weight: u64, weigher: W) -> Self
    where
        W: Fn(&K, &V) -> u64 + Send + Sync + 'static,
    {
        Self {
            name,
            max_weight,
            weigher: Box::new(weigher),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                total_weight: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// A cache bounded by entry count.
    pub fn with_capacity(name: &'static str, max_entries: u64) -> Self {
        Self::new(name, max_entries, |_, _| 1)
    }

    /// Look up `key`, running `load` if no entry or in-flight load exists.
    ///
    /// The loader runs without the cache lock held. At most one loader runs
    /// per key at a time; concurrent callers for that key wait for it.
    pub fn get_or_load<F>(&self, key: &K, load: F) -> Result<Lookup<V>, E>
    where
        F: FnOnce(&K) -> Result<Lookup<V>, E>,
    {
        let slot = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            match inner.entries.get(key) {
                Some(entry) => {
                    let slot = Arc::clone(&entry.slot);
                    let resolved = entry.tick.is_some();
                    inner.stats.hits += 1;
                    if resolved {
                        inner.touch(key);
                    }
                    slot
                }
                None => {
                    let slot = Slot::loading();
                    inner.entries.insert(
                        key.clone(),
                        Entry {
                            slot: Arc::clone(&slot),
                            tick: None,
                            weight: 0,
                        },
                    );
                    inner.stats.misses += 1;
                    slot
                }
            }
        };

        let mut ran = false;
        let outcome = slot
            .cell
            .get_or_init(|| {
                ran = true;
                load(key)
            })
            .clone();
        self.settle(key, &slot, &outcome, ran);
        outcome
    }

    fn settle(&self, key: &K, slot: &Arc<Slot<V, E>>, outcome: &Result<Lookup<V>, E>, ran: bool) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if ran {
            inner.stats.loads += 1;
        }
        let ours = inner
            .entries
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot));
        if !ours {
            // Invalidated or replaced while loading: the result is not cached.
            return;
        }
        match outcome {
            Ok(Lookup::Present(value)) => {
                let already_resolved = inner.entries.get(key).is_some_and(|e| e.tick.is_some());
                if already_resolved {
                    return;
                }
                let weight = (self.weigher)(key, value);
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.weight = weight;
                }
                inner.total_weight += weight;
                inner.touch(key);
                inner.evict_over(self.max_weight, self.name);
            }
            Ok(Lookup::Absent) | Err(_) => {
                inner.remove(key);
            }
        }
    }

    /// Insert a present value, replacing any entry or in-flight load.
    pub fn put(&self, key: K, value: V) {
        let weight = (self.weigher)(&key, &value);
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.remove(&key);
        inner.entries.insert(
            key.clone(),
            Entry {
                slot: Slot::resolved(value),
                tick: None,
                weight,
            },
        );
        inner.total_weight += weight;
        inner.touch(&key);
        inner.evict_over(self.max_weight, self.name);
    }

    /// Drop the entry for `key`. An in-flight load for it will not be cached.
    pub fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.remove(key) {
            inner.stats.invalidations += 1;
        }
    }

    /// Returns the cached value without loading or touching recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let entry = inner.entries.get(key)?;
        entry.tick?;
        match entry.slot.cell.get() {
            Some(Ok(Lookup::Present(v))) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            entries: inner.entries.len(),
            weight: inner.total_weight,
            ..inner.stats
        }
    }
}

impl<K, V, E> std::fmt::Debug for SingleFlightCache<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("name", &self.name)
            .field("max_weight", &self.max_weight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;

    type TestCache = SingleFlightCache<u32, String, String>;

    fn present(v: &str) -> Result<Lookup<String>, String> {
        Ok(Lookup::Present(v.to_string()))
    }

    #[test]
    fn present_values_are_cached() {
        let cache = TestCache::with_capacity("test", 10);
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            let got = cache
                .get_or_load(&1, |_| {
                    loads.fetch_add(1, Ordering::SeqCst);
                    present("one")
                })
                .unwrap();
            assert_eq!(got, Lookup::Present("one".into()));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn absent_is_not_sticky() {
        let cache = TestCache::with_capacity("test", 10);
        assert_eq!(cache.get_or_load(&7, |_| Ok(Lookup::Absent)).unwrap(), Lookup::Absent);
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.get_or_load(&7, |_| present("late")).unwrap(), Lookup::Present("late".into()));
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = TestCache::with_capacity("test", 10);
        assert_eq!(cache.get_or_load(&1, |_| Err("boom".to_string())), Err("boom".to_string()));
        assert_eq!(cache.get_or_load(&1, |_| present("ok")).unwrap(), Lookup::Present("ok".into()));
    }

    #[test]
    fn concurrent_misses_share_one_load() {
        let cache = Arc::new(TestCache::with_capacity("test", 10));
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_load(&42, |_| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            Ok(Lookup::Absent)
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Lookup::Absent);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weight_budget_evicts_least_recently_used() {
        let cache: SingleFlightCache<u32, String, String> =
            SingleFlightCache::new("bytes", 10, |_, v: &String| v.len() as u64);
        cache.get_or_load(&1, |_| present("aaaa")).unwrap();
        cache.get_or_load(&2, |_| present("bbbb")).unwrap();
        // Touch 1 so that 2 is the oldest.
        cache.get_or_load(&1, |_| present("unused")).unwrap();
        cache.get_or_load(&3, |_| present("cccc")).unwrap();

        assert!(cache.peek(&1).is_some());
        assert!(cache.peek(&2).is_none());
        assert!(cache.peek(&3).is_some());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.weight, 8);
    }

    #[test]
    fn oversized_value_is_returned_but_not_kept() {
        let cache: SingleFlightCache<u32, String, String> =
            SingleFlightCache::new("bytes", 3, |_, v: &String| v.len() as u64);
        let got = cache.get_or_load(&1, |_| present("too big")).unwrap();
        assert_eq!(got, Lookup::Present("too big".into()));
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().weight, 0);
    }

    #[test]
    fn invalidation_during_load_discards_result() {
        let cache = Arc::new(TestCache::with_capacity("test", 10));
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let loader = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                cache
                    .get_or_load(&5, |_| {
                        started.wait();
                        release.wait();
                        present("stale")
                    })
                    .unwrap()
            })
        };
        started.wait();
        cache.invalidate(&5);
        release.wait();
        assert_eq!(loader.join().unwrap(), Lookup::Present("stale".into()));
        assert!(cache.peek(&5).is_none());
        assert_eq!(cache.get_or_load(&5, |_| present("fresh")).unwrap(), Lookup::Present("fresh".into()));
    }

    #[test]
    fn put_replaces_entry() {
        let cache = TestCache::with_capacity("test", 10);
        cache.get_or_load(&1, |_| present("old")).unwrap();
        cache.put(1, "new".into());
        assert_eq!(cache.peek(&1), Some("new".into()));
        assert_eq!(cache.stats().weight, 1);
    }

    #[test]
    fn capacity_bound_counts_entries() {
        let cache = TestCache::with_capacity("test", 2);
        for key in 0..5 {
            cache.get_or_load(&key, |k| present(&k.to_string())).unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 3);
        assert!(cache.peek(&4).is_some());
    }
}
