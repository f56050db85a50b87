#![doc = include_str!("../README.md")]

pub mod error;
pub mod metric;
pub mod scenario;
pub mod transaction;

mod progress;
mod vu;

pub use error::{MetricError, ScenarioError};
pub use metric::{Counter, Metrics, Rate, Trend};
pub use scenario::{ConfigurableScenario, Scenario};
pub use transaction::transaction;

pub mod prelude {
    pub use crate::metric::{Counter, Metrics, Rate, Trend};
    pub use crate::scenario::{ConfigurableScenario, Scenario};
    pub use crate::transaction::transaction;

    pub use volley_core::{RunConfig, RunStatistics, ThresholdExpr};
}
