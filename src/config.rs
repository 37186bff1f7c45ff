use std::time::Duration;

/// Timing and capacity settings of a [`BatchCollapse`](crate::BatchCollapse).
///
/// ```rust
/// use std::time::Duration;
/// use batch_collapse::BatchCollapseConfig;
///
/// let config = BatchCollapseConfig::new()
///     .retention(Duration::from_millis(200))
///     .max_duration(Duration::from_secs(2));
/// ```
#[derive(Clone, Debug)]
pub struct BatchCollapseConfig {
    retention: Duration,
    max_duration: Duration,
    poll_interval: Duration,
    max_pending: Option<usize>,
}

impl Default for BatchCollapseConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5),
            max_duration: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            max_pending: None,
        }
    }
}

impl BatchCollapseConfig {
    pub fn new() -> Self {
        Self::default()
    }
    /// Quiet time after the latest collapse before a flush is allowed.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
    /// Ceiling on the time since the previous flush. Expected to be at least
    /// the retention; when it is not, it simply wins.
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
    /// How often the driver thread wakes up to evaluate pending entries.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
    /// Caps the number of distinct pending keys. Collapses for new keys past
    /// the cap are rejected until something flushes.
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }
    pub fn get_retention(&self) -> Duration {
        self.retention
    }
    pub fn get_max_duration(&self) -> Duration {
        self.max_duration
    }
    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }
    pub fn get_max_pending(&self) -> Option<usize> {
        self.max_pending
    }
}
