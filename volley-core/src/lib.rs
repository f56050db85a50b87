mod config;
mod constants;
mod stats;
mod summary;
mod threshold;

pub use config::*;
pub use constants::*;
pub use stats::*;
pub use summary::*;
pub use threshold::*;
