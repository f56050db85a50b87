//! Load test for the domain events service.
//!
//! Every iteration marks a random domain delivered, another one bounced and fetches a third,
//! recording each call's failure into its own rate metric, then idles for a second.
pub mod call;
pub mod config;
pub mod domain;
pub mod error;
pub mod scenario;

pub use call::{Call, FailureRates, Target};
pub use config::Cli;
pub use error::LoadError;
pub use scenario::{options, scenario, DomainEvents};

/// Exit code of a run that crossed a threshold.
pub const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;
