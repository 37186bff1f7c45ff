use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use rayon::prelude::*;

use crate::store::{CollapseKey, CollapseValue, Flush};

pub type ExecuteFn<K, V> = Arc<dyn Fn(Flush<K, V>) + Send + Sync + 'static>;

/// Delivers flushed values to the user callback.
///
/// Runs with no engine lock held. A panicking callback is caught and logged so
/// one bad value never stops the driver or the rest of a drain.
pub struct Sink<K: CollapseKey, V: CollapseValue> {
    execute: Option<ExecuteFn<K, V>>,
}

impl<K: CollapseKey, V: CollapseValue> Sink<K, V> {
    pub fn new(execute: Option<ExecuteFn<K, V>>) -> Self {
        Self { execute }
    }

    /// `false` when the engine was built without a callback. Such an engine
    /// never takes anything out of its store.
    pub fn is_set(&self) -> bool {
        self.execute.is_some()
    }

    /// Delivers in order, on the calling thread.
    pub fn deliver(&self, flushed: Vec<Flush<K, V>>) {
        let Some(execute) = &self.execute else {
            return;
        };
        for flush in flushed {
            invoke(execute, flush);
        }
    }

    /// Delivers a drain. Several values go through the rayon pool, and this
    /// returns once every callback has returned.
    pub fn deliver_all(&self, flushed: Vec<Flush<K, V>>) {
        let Some(execute) = &self.execute else {
            return;
        };
        if flushed.len() <= 1 {
            return self.deliver(flushed);
        }
        flushed
            .into_par_iter()
            .for_each(|flush| invoke(execute, flush));
    }
}

fn invoke<K: CollapseKey, V: CollapseValue>(execute: &ExecuteFn<K, V>, flush: Flush<K, V>) {
    let key = flush.key().clone();
    let reason = flush.reason();
    log::trace!("Batch collapse : executing [{:?}] ({})", key, reason);
    if catch_unwind(AssertUnwindSafe(|| execute(flush))).is_err() {
        log::error!(
            "Batch collapse : execute callback panicked for key [{:?}] ({})",
            key,
            reason
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::policy::FlushReason;

    fn counting_sink(calls: &Arc<AtomicUsize>, panic_on: u32) -> Sink<u32, u32> {
        let calls = calls.clone();
        Sink::new(Some(Arc::new(move |flush: Flush<u32, u32>| {
            if *flush.value() == panic_on {
                panic!("intentional panic for sink test");
            }
            calls.fetch_add(1, Ordering::SeqCst);
        })))
    }

    fn batch(values: &[u32]) -> Vec<Flush<u32, u32>> {
        values
            .iter()
            .map(|v| Flush::new(*v, *v, FlushReason::Drain))
            .collect()
    }

    #[test]
    fn panicking_callback_does_not_stop_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = counting_sink(&calls, 2);
        sink.deliver(batch(&[1, 2, 3]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parallel_drain_reaches_every_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = counting_sink(&calls, u32::MAX);
        sink.deliver_all(batch(&(0..64).collect::<Vec<_>>()));
        assert_eq!(calls.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn unset_sink_is_silent() {
        let sink: Sink<u32, u32> = Sink::new(None);
        assert!(!sink.is_set());
        sink.deliver(batch(&[1]));
        sink.deliver_all(batch(&[1, 2]));
    }
}
