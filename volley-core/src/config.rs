use crate::{ThresholdExpr, DEFAULT_DURATION, DEFAULT_GRACEFUL_STOP, DEFAULT_VUS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::collections::BTreeMap;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::time::Duration;

/// Options a scenario runs with. Read once when the run starts.
///
/// Deserializes from an options document such as
///
/// ```json
/// {
///     "vus": 100,
///     "duration": "60s",
///     "thresholds": { "http_req_duration": ["p(95)<200"] }
/// }
/// ```
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub name: String,
    /// Number of concurrently running virtual users.
    pub vus: NonZeroUsize,
    /// Upper bound on the wall-clock length of the run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Total iterations shared by all VUs. The run ends early once they are used up.
    pub iterations: Option<NonZeroU64>,
    /// Global cap on transactions per second across all VUs.
    pub max_rps: Option<NonZeroU32>,
    #[serde(with = "humantime_serde")]
    pub graceful_stop: Duration,
    /// Metric name (optionally with a `{name:<tag>}` selector) to threshold expressions.
    #[serde_as(as = "BTreeMap<_, Vec<DisplayFromStr>>")]
    pub thresholds: BTreeMap<String, Vec<ThresholdExpr>>,
}

impl RunConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn add_threshold(&mut self, metric: &str, expr: ThresholdExpr) {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expr);
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            vus: DEFAULT_VUS,
            duration: DEFAULT_DURATION,
            iterations: None,
            max_rps: None,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            thresholds: BTreeMap::new(),
        }
    }
}
