pub use bounds::{CollapseKey, CollapseValue};
pub use flush::{CollapseOutcome, Flush};
pub use pending::PendingStore;

mod pending {
    use std::{
        sync::{
            Mutex, MutexGuard, PoisonError,
            atomic::{AtomicBool, Ordering},
        },
        time::{Duration, Instant},
    };

    use dashmap::DashMap;

    use crate::{
        config::BatchCollapseConfig,
        policy::{self, Watermarks},
    };

    use super::{
        bounds::{CollapseKey, CollapseValue},
        flush::{CollapseOutcome, Flush},
    };

    /// Pending values keyed by `K`, plus the watermark pair they share.
    ///
    /// Every decision that inserts or removes an entry is taken while holding
    /// the `clock` lock, so an entry leaves the map in the same critical
    /// section that decided to flush it. Plain reads (`get`, `len`) go to the
    /// map directly and never wait on that lock.
    pub struct PendingStore<K: CollapseKey, V: CollapseValue> {
        entries: DashMap<K, V>,
        clock: Mutex<Watermarks>,
        canceled: AtomicBool,
        retention: Duration,
        max_duration: Duration,
        max_pending: Option<usize>,
    }

    impl<K: CollapseKey, V: CollapseValue> PendingStore<K, V> {
        pub fn new(config: &BatchCollapseConfig) -> Self {
            let retention = config.get_retention();
            Self {
                entries: DashMap::new(),
                clock: Mutex::new(Watermarks::new(Instant::now(), retention)),
                canceled: AtomicBool::new(false),
                retention,
                max_duration: config.get_max_duration(),
                max_pending: config.get_max_pending(),
            }
        }

        // Nothing user supplied runs under this lock, a poisoned guard is still consistent.
        fn lock_clock(&self) -> MutexGuard<'_, Watermarks> {
            self.clock.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Stores `value` under `key` unless the key is already pending, and
        /// re-arms the retention window.
        pub fn collapse(&self, key: K, value: V) -> CollapseOutcome {
            let mut clock = self.lock_clock();
            let outcome = if self.entries.contains_key(&key) {
                CollapseOutcome::Coalesced
            } else if self.max_pending.is_some_and(|max| self.entries.len() >= max) {
                // rejected arrivals leave the retention window alone
                return CollapseOutcome::Rejected;
            } else {
                self.entries.insert(key, value);
                CollapseOutcome::Inserted
            };
            clock.rearm(Instant::now(), self.retention);
            outcome
        }

        /// Removes and returns every entry due at this instant.
        ///
        /// Once canceled, only a forced pass takes anything out.
        pub fn evaluate(&self, force: bool) -> Vec<Flush<K, V>> {
            let mut clock = self.lock_clock();
            if !force && self.is_canceled() {
                return vec![];
            }
            self.take_due(&mut clock, force)
        }

        /// Forced pass that also marks the store canceled. Returns `None` when
        /// the store was already canceled.
        pub fn drain(&self) -> Option<Vec<Flush<K, V>>> {
            let mut clock = self.lock_clock();
            if self.is_canceled() {
                return None;
            }
            let flushed = self.take_due(&mut clock, true);
            self.canceled.store(true, Ordering::Release);
            Some(flushed)
        }

        /// Marks the store canceled without touching its entries.
        pub fn mark_canceled(&self) -> bool {
            let _clock = self.lock_clock();
            !self.canceled.swap(true, Ordering::AcqRel)
        }

        fn take_due(&self, clock: &mut Watermarks, force: bool) -> Vec<Flush<K, V>> {
            let now = Instant::now();
            let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
            let mut flushed = Vec::new();
            for key in keys {
                // watermarks move on every flush, so each key is judged against the latest pair
                let Some(reason) = policy::flush_reason(now, clock, self.max_duration, force)
                else {
                    continue;
                };
                if let Some((key, value)) = self.entries.remove(&key) {
                    clock.flushed(now, self.retention);
                    flushed.push(Flush::new(key, value, reason));
                }
            }
            flushed
        }

        pub fn is_canceled(&self) -> bool {
            self.canceled.load(Ordering::Acquire)
        }
        pub fn contains(&self, key: &K) -> bool {
            self.entries.contains_key(key)
        }
        pub fn len(&self) -> usize {
            self.entries.len()
        }
        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }
        pub fn watermarks(&self) -> Watermarks {
            *self.lock_clock()
        }
    }

    impl<K: CollapseKey, V: CollapseValue + Clone> PendingStore<K, V> {
        pub fn get(&self, key: &K) -> Option<V> {
            self.entries.get(key).map(|v| v.value().clone())
        }
        pub fn snapshot(&self) -> Vec<(K, V)> {
            self.entries
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect()
        }
    }
}

mod flush {
    use std::fmt::Display;

    use crate::policy::FlushReason;

    /// A value leaving the store, handed to the execute callback.
    #[derive(Debug)]
    pub struct Flush<K, V> {
        key: K,
        value: V,
        reason: FlushReason,
    }

    impl<K, V> Flush<K, V> {
        pub fn new(key: K, value: V, reason: FlushReason) -> Self {
            Self { key, value, reason }
        }
        pub fn key(&self) -> &K {
            &self.key
        }
        pub fn value(&self) -> &V {
            &self.value
        }
        pub fn reason(&self) -> FlushReason {
            self.reason
        }
        pub fn into_value(self) -> V {
            self.value
        }
        pub fn into_parts(self) -> (K, V) {
            (self.key, self.value)
        }
    }

    /// What `collapse` did with the value it was given.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CollapseOutcome {
        /// The key was absent; the value is now pending.
        Inserted,
        /// The key was already pending; its first value is kept.
        Coalesced,
        /// The key was absent but the store is at its `max_pending` cap.
        Rejected,
    }

    impl Display for CollapseOutcome {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Inserted => write!(f, "inserted"),
                Self::Coalesced => write!(f, "coalesced"),
                Self::Rejected => write!(f, "rejected (pending cap reached)"),
            }
        }
    }
}

mod bounds {
    use std::{fmt::Debug, hash::Hash};

    /// Trait implemented by types usable as keys of a [`BatchCollapse`](crate::BatchCollapse).
    ///
    /// Keys are cloned when a flush pass walks the store, show up in log
    /// records, and must be shareable with the driver thread.
    ///
    /// ### Blanket implementation
    /// ```rust,ignore
    /// impl<T: Send + Sync + Clone + Eq + Hash + Debug + 'static> CollapseKey for T
    /// ```
    pub trait CollapseKey: Send + Sync + Clone + Hash + Eq + Debug + 'static {}

    impl<T: Send + Sync + Clone + Eq + Hash + Debug + 'static> CollapseKey for T {}

    /// Trait implemented by types usable as pending values.
    pub trait CollapseValue: Send + Sync + 'static {}

    impl<T: Send + Sync + 'static> CollapseValue for T {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::BatchCollapseConfig, policy::FlushReason};

    fn store(retention_ms: u64) -> PendingStore<&'static str, u32> {
        PendingStore::new(
            &BatchCollapseConfig::new()
                .retention(Duration::from_millis(retention_ms))
                .max_duration(Duration::from_secs(60)),
        )
    }

    #[test]
    fn first_value_wins() {
        let store = store(1_000);
        assert_eq!(store.collapse("a", 1), CollapseOutcome::Inserted);
        assert_eq!(store.collapse("a", 2), CollapseOutcome::Coalesced);
        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn collapse_rearms_next_exec() {
        let store = store(1_000);
        let before = store.watermarks().next_exec();
        std::thread::sleep(Duration::from_millis(5));
        store.collapse("a", 1);
        assert!(store.watermarks().next_exec().unwrap() > before.unwrap());
    }

    #[test]
    fn normal_pass_waits_for_retention() {
        let store = store(1_000);
        store.collapse("a", 1);
        assert!(store.evaluate(false).is_empty());
        assert!(store.contains(&"a"));
    }

    #[test]
    fn normal_pass_flushes_one_entry_per_window() {
        let store = store(2);
        store.collapse("a", 1);
        store.collapse("b", 2);
        std::thread::sleep(Duration::from_millis(10));

        let flushed = store.evaluate(false);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].reason(), FlushReason::Retention);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn forced_pass_takes_everything() {
        let store = store(1_000);
        store.collapse("a", 1);
        store.collapse("b", 2);
        let mut values: Vec<u32> = store
            .evaluate(true)
            .into_iter()
            .map(|f| *f.value())
            .collect();
        values.sort();
        assert_eq!(values, vec![1, 2]);
        assert!(store.is_empty());
    }

    #[test]
    fn drain_runs_once() {
        let store = store(1_000);
        store.collapse("a", 1);
        let first = store.drain().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].reason(), FlushReason::Drain);
        assert!(store.is_canceled());

        store.collapse("b", 2);
        assert!(store.drain().is_none());
        assert_eq!(store.get(&"b"), Some(2));
    }

    #[test]
    fn canceled_store_ignores_timer_passes() {
        let store = store(1);
        assert!(store.mark_canceled());
        assert!(!store.mark_canceled());
        store.collapse("a", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.evaluate(false).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn pending_cap_rejects_new_keys_only() {
        let store = PendingStore::<u32, u32>::new(&BatchCollapseConfig::new().max_pending(2));
        assert_eq!(store.collapse(1, 1), CollapseOutcome::Inserted);
        assert_eq!(store.collapse(2, 2), CollapseOutcome::Inserted);
        assert_eq!(store.collapse(3, 3), CollapseOutcome::Rejected);
        assert_eq!(store.collapse(1, 10), CollapseOutcome::Coalesced);
        assert_eq!(store.len(), 2);
        assert!(!store.contains(&3));
    }
}
