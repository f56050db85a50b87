use std::num::NonZeroUsize;
use std::time::Duration;

pub const DEFAULT_VUS: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(1) };

pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);

/// How long in-flight iterations may keep running once the duration has elapsed.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Interval between progress lines while a scenario is running.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Total number of HTTP transactions issued.
pub const HTTP_REQS: &str = "http_reqs";

/// Latency of every HTTP transaction.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";

/// Completed scenario iterations.
pub const ITERATIONS: &str = "iterations";

/// Wall-clock time of a full scenario iteration.
pub const ITERATION_DURATION: &str = "iteration_duration";
