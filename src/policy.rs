pub use reason::FlushReason;
pub use watermarks::Watermarks;

use std::time::{Duration, Instant};

/// Decides whether a pending entry flushes at `now`, and why.
///
/// A forced pass always flushes. Otherwise the entry flushes once the retention
/// window has elapsed with no new arrival, or once `max_duration` has passed
/// since the previous flush, whichever comes first.
pub fn flush_reason(
    now: Instant,
    watermarks: &Watermarks,
    max_duration: Duration,
    force: bool,
) -> Option<FlushReason> {
    if force {
        return Some(FlushReason::Drain);
    }
    if watermarks.next_exec().is_some_and(|next| now > next) {
        return Some(FlushReason::Retention);
    }
    match watermarks.last_exec().checked_add(max_duration) {
        Some(ceiling) if now > ceiling => Some(FlushReason::MaxDuration),
        _ => None,
    }
}

pub fn should_flush(
    now: Instant,
    watermarks: &Watermarks,
    max_duration: Duration,
    force: bool,
) -> bool {
    flush_reason(now, watermarks, max_duration, force).is_some()
}

mod watermarks {
    use std::time::{Duration, Instant};

    /// The clock pair shared by every key of an engine.
    ///
    /// `last_exec` is the instant of the most recent flush, `next_exec` the
    /// instant before which no retention-based flush happens. `next_exec` is
    /// `None` when the retention reaches past what an `Instant` can hold; the
    /// window then never elapses and only the max duration flushes.
    #[derive(Clone, Copy, Debug)]
    pub struct Watermarks {
        last_exec: Instant,
        next_exec: Option<Instant>,
    }

    impl Watermarks {
        pub fn new(now: Instant, retention: Duration) -> Self {
            Self {
                last_exec: now,
                next_exec: now.checked_add(retention),
            }
        }
        pub fn last_exec(&self) -> Instant {
            self.last_exec
        }
        pub fn next_exec(&self) -> Option<Instant> {
            self.next_exec
        }
        /// Pushes the retention window out after an arrival.
        pub fn rearm(&mut self, now: Instant, retention: Duration) {
            self.next_exec = now.checked_add(retention);
        }
        /// Records a flush at `now` and re-arms the retention window.
        pub fn flushed(&mut self, now: Instant, retention: Duration) {
            self.last_exec = now;
            self.next_exec = now.checked_add(retention);
        }
    }
}

mod reason {
    use std::fmt::Display;

    /// What made an entry flush.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum FlushReason {
        /// The retention window elapsed with no new arrival.
        Retention,
        /// The max duration since the previous flush was reached.
        MaxDuration,
        /// Forced out by `cancel()`.
        Drain,
    }

    impl Display for FlushReason {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Retention => write!(f, "retention elapsed"),
                Self::MaxDuration => write!(f, "max duration reached"),
                Self::Drain => write!(f, "drained on cancel"),
            }
        }
    }
}
