mod config;
mod driver;
mod engine;
mod errors;
mod policy;
mod single;
mod sink;
mod store;

pub use config::BatchCollapseConfig;
pub use driver::DriverState;
pub use engine::{BatchCollapse, BatchCollapseBuilder};
pub use errors::BatchCollapseError;
pub use policy::{FlushReason, Watermarks, flush_reason, should_flush};
pub use single::{SingleCollapse, SingleCollapseBuilder};
pub use store::{CollapseKey, CollapseOutcome, CollapseValue, Flush};

pub mod prelude {
    pub use super::{
        BatchCollapse, BatchCollapseConfig, BatchCollapseError, CollapseOutcome, Flush,
        FlushReason, SingleCollapse,
    };
}
