use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::{
    config::BatchCollapseConfig,
    sink::Sink,
    store::{CollapseKey, CollapseValue, PendingStore},
};
use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

// A zero interval would turn the loop into a spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Running,
    /// Terminal. A stopped driver is never restarted.
    Stopped,
}

impl Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared view of the driver thread's state.
#[derive(Clone)]
pub struct DriverStatus(Arc<AtomicBool>);

impl DriverStatus {
    fn running() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
    fn stopped(&self) {
        self.0.store(false, Ordering::Release);
    }
    pub fn state(&self) -> DriverState {
        if self.0.load(Ordering::Acquire) {
            DriverState::Running
        } else {
            DriverState::Stopped
        }
    }
}

pub struct DriverLoop;

impl DriverLoop {
    /// DriverLoop runs on a separate thread. Each round waits one poll interval
    /// on the cancel channel; a message or a disconnected channel (every engine
    /// handle dropped) stops it for good, a timeout runs a normal flush pass
    /// and hands whatever left the store to the sink.
    pub fn run<K: CollapseKey, V: CollapseValue>(
        config: &BatchCollapseConfig,
        store: &Arc<PendingStore<K, V>>,
        sink: &Arc<Sink<K, V>>,
        cancel: Receiver<()>,
    ) -> std::io::Result<DriverStatus> {
        let store = store.clone();
        let sink = sink.clone();
        let status = DriverStatus::running();
        let thread_status = status.clone();

        let refresh_duration = config.get_poll_interval().max(MIN_POLL_INTERVAL);

        std::thread::Builder::new()
            .name("batch-collapse-driver".to_string())
            .spawn(move || {
                log::debug!(
                    "Batch collapse : driver started, polling every {:?}",
                    refresh_duration
                );
                loop {
                    match cancel.recv_timeout(refresh_duration) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) => {
                            log::debug!("Batch collapse : driver canceled");
                            break;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            log::debug!("Batch collapse : every handle dropped, driver exiting");
                            break;
                        }
                    }
                    if !sink.is_set() {
                        continue;
                    }
                    let flushed = store.evaluate(false);
                    if !flushed.is_empty() {
                        log::debug!("Batch collapse : flushing {} value(s)", flushed.len());
                        sink.deliver(flushed);
                    }
                }
                thread_status.stopped();
            })?;

        Ok(status)
    }
}
