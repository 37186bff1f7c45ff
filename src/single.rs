use std::sync::Arc;

use crate::{
    BatchCollapse, BatchCollapseConfig, BatchCollapseError, CollapseOutcome, CollapseValue,
    DriverState,
};

pub struct SingleCollapseBuilder<V: CollapseValue> {
    execute: Option<Arc<dyn Fn(V) + Send + Sync + 'static>>,
    config: BatchCollapseConfig,
}

impl<V: CollapseValue> SingleCollapseBuilder<V> {
    pub fn with_execute(mut self, execute: impl Fn(V) + Send + Sync + 'static) -> Self {
        self.execute = Some(Arc::new(execute));
        self
    }

    pub fn build(self) -> Result<SingleCollapse<V>, BatchCollapseError> {
        let builder = BatchCollapse::new(self.config);
        let inner = match self.execute {
            Some(execute) => builder
                .with_execute(move |flush| execute(flush.into_value()))
                .build()?,
            None => builder.build()?,
        };
        Ok(SingleCollapse { inner })
    }
}

/// A [`BatchCollapse`] with a single slot.
///
/// Holds at most one pending value. A `collapse` while the slot is full keeps
/// the first value and only re-arms the retention window.
pub struct SingleCollapse<V: CollapseValue> {
    inner: BatchCollapse<(), V>,
}

impl<V: CollapseValue> Clone for SingleCollapse<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: CollapseValue> SingleCollapse<V> {
    pub fn new(config: BatchCollapseConfig) -> SingleCollapseBuilder<V> {
        SingleCollapseBuilder {
            execute: None,
            config,
        }
    }
    pub fn create(
        config: BatchCollapseConfig,
        execute: impl Fn(V) + Send + Sync + 'static,
    ) -> Result<Self, BatchCollapseError> {
        Self::new(config).with_execute(execute).build()
    }
    pub fn collapse(&self, value: V) -> CollapseOutcome {
        self.inner.collapse((), value)
    }
    /// Flushes the slot if it holds a value and cancels the engine. Returns
    /// `true` when a value was drained.
    pub fn cancel(&self) -> bool {
        self.inner.cancel() > 0
    }
    pub fn is_pending(&self) -> bool {
        self.inner.is_pending(&())
    }
    pub fn is_canceled(&self) -> bool {
        self.inner.is_canceled()
    }
    pub fn driver_state(&self) -> DriverState {
        self.inner.driver_state()
    }
}

impl<V: CollapseValue + Clone> SingleCollapse<V> {
    pub fn value(&self) -> Option<V> {
        self.inner.pending(&())
    }
}
