pub use main_type::{BatchCollapse, BatchCollapseBuilder};

mod main_type {
    use std::sync::Arc;

    use crossbeam_channel::Sender;

    use crate::{
        config::BatchCollapseConfig,
        driver::{DriverLoop, DriverState, DriverStatus},
        errors::BatchCollapseError,
        policy::Watermarks,
        sink::{ExecuteFn, Sink},
        store::{CollapseKey, CollapseOutcome, CollapseValue, Flush, PendingStore},
    };

    pub struct BatchCollapseBuilder<K: CollapseKey, V: CollapseValue> {
        execute: Option<ExecuteFn<K, V>>,
        config: BatchCollapseConfig,
    }

    impl<K: CollapseKey, V: CollapseValue> BatchCollapseBuilder<K, V> {
        /// Callback invoked once per flushed value. Without one the engine still
        /// accepts collapses but never takes anything out of its store.
        pub fn with_execute(
            mut self,
            execute: impl Fn(Flush<K, V>) + Send + Sync + 'static,
        ) -> Self {
            self.execute = Some(Arc::new(execute));
            self
        }

        /// Builds the engine and starts its driver thread.
        pub fn build(self) -> Result<BatchCollapse<K, V>, BatchCollapseError> {
            if self.config.get_max_duration() < self.config.get_retention() {
                log::warn!(
                    "Batch collapse : max duration {:?} is below retention {:?}, max duration wins",
                    self.config.get_max_duration(),
                    self.config.get_retention()
                );
            }
            let store = Arc::new(PendingStore::new(&self.config));
            let sink = Arc::new(Sink::new(self.execute));
            let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

            let driver = DriverLoop::run(&self.config, &store, &sink, cancel_rx)?;

            Ok(BatchCollapse {
                shared: Arc::new(Shared {
                    store,
                    sink,
                    driver,
                    cancel_tx,
                }),
            })
        }
    }

    struct Shared<K: CollapseKey, V: CollapseValue> {
        store: Arc<PendingStore<K, V>>,
        sink: Arc<Sink<K, V>>,
        driver: DriverStatus,
        // dropping the last handle disconnects the driver
        cancel_tx: Sender<()>,
    }

    /// Collapses bursts of values per key into one delayed callback.
    ///
    /// The first value collapsed for a key is kept until it flushes; later
    /// values for the same key only re-arm the retention window. A background
    /// thread flushes a value once the window elapses with no new arrival, or
    /// once `max_duration` has passed since the previous flush. The retention
    /// and max-duration clocks are shared by every key.
    ///
    /// Handles are cheap to clone and share the same state. Call
    /// [`cancel`](Self::cancel) to stop the driver and drain what is pending;
    /// dropping every handle stops the driver without a drain.
    pub struct BatchCollapse<K: CollapseKey, V: CollapseValue> {
        shared: Arc<Shared<K, V>>,
    }

    impl<K: CollapseKey, V: CollapseValue> Clone for BatchCollapse<K, V> {
        fn clone(&self) -> Self {
            Self {
                shared: self.shared.clone(),
            }
        }
    }

    impl<K: CollapseKey, V: CollapseValue> BatchCollapse<K, V> {
        /// Creates a new [`BatchCollapseBuilder<K, V>`].
        ///
        /// ### Example
        /// ```rust
        /// use std::time::Duration;
        /// use batch_collapse::{BatchCollapse, BatchCollapseConfig};
        ///
        /// let batch = BatchCollapse::<&str, u32>::new(
        ///     BatchCollapseConfig::new().retention(Duration::from_millis(50)),
        /// )
        /// .with_execute(|flush| println!("{:?} -> {}", flush.key(), flush.value()))
        /// .build()
        /// .unwrap();
        ///
        /// batch.collapse("user:42", 1);
        /// batch.collapse("user:42", 2); // coalesced, 1 is kept
        /// batch.cancel();
        /// ```
        pub fn new(config: BatchCollapseConfig) -> BatchCollapseBuilder<K, V> {
            BatchCollapseBuilder {
                execute: None,
                config,
            }
        }

        /// Shorthand for `new(config).with_execute(execute).build()`.
        pub fn create(
            config: BatchCollapseConfig,
            execute: impl Fn(Flush<K, V>) + Send + Sync + 'static,
        ) -> Result<Self, BatchCollapseError> {
            Self::new(config).with_execute(execute).build()
        }

        /// Stores `value` for `key` unless a value is already pending there, and
        /// re-arms the retention window either way.
        ///
        /// Collapses after [`cancel`](Self::cancel) are still stored but nothing
        /// flushes them any more.
        pub fn collapse(&self, key: K, value: V) -> CollapseOutcome {
            let store = &self.shared.store;
            if store.is_canceled() {
                log::warn!(
                    "Batch collapse : collapse for [{:?}] after cancel, it will not be flushed",
                    key
                );
            }
            let outcome = store.collapse(key, value);
            if outcome == CollapseOutcome::Rejected {
                log::warn!(
                    "Batch collapse : pending cap reached ({} keys), value dropped",
                    store.len()
                );
            }
            outcome
        }

        /// Stops the driver, flushes every pending value, and marks the engine
        /// canceled. Returns the number of values drained.
        ///
        /// Every drained callback has returned when this returns. A value the
        /// driver took out just before the cancel is not part of the drain, and
        /// its callback may still be running after this returns. Only the first
        /// call drains; later calls return 0.
        pub fn cancel(&self) -> usize {
            let shared = &self.shared;
            // full buffer: a cancel is already queued. disconnected: driver gone
            let _ = shared.cancel_tx.try_send(());

            if !shared.sink.is_set() {
                if shared.store.mark_canceled() {
                    log::info!(
                        "Batch collapse : canceled with no execute callback, {} value(s) left pending",
                        shared.store.len()
                    );
                }
                return 0;
            }
            match shared.store.drain() {
                Some(flushed) => {
                    let drained = flushed.len();
                    log::info!("Batch collapse : canceled, draining {} value(s)", drained);
                    shared.sink.deliver_all(flushed);
                    drained
                }
                None => {
                    log::debug!("Batch collapse : already canceled");
                    0
                }
            }
        }

        pub fn is_canceled(&self) -> bool {
            self.shared.store.is_canceled()
        }
        pub fn driver_state(&self) -> DriverState {
            self.shared.driver.state()
        }
        pub fn is_pending(&self, key: &K) -> bool {
            self.shared.store.contains(key)
        }
        pub fn pending_len(&self) -> usize {
            self.shared.store.len()
        }
        pub fn is_empty(&self) -> bool {
            self.shared.store.is_empty()
        }
        /// Current `last_exec` / `next_exec` pair.
        pub fn watermarks(&self) -> Watermarks {
            self.shared.store.watermarks()
        }

        #[cfg(test)]
        pub(crate) fn shared_driver_status(&self) -> DriverStatus {
            self.shared.driver.clone()
        }
    }

    impl<K: CollapseKey, V: CollapseValue + Clone> BatchCollapse<K, V> {
        /// The value waiting for `key`, if any.
        pub fn pending(&self, key: &K) -> Option<V> {
            self.shared.store.get(key)
        }
        /// Every pending key and value, in no particular order.
        pub fn snapshot(&self) -> Vec<(K, V)> {
            self.shared.store.snapshot()
        }
    }
}
