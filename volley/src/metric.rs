//! Named metric sinks
//!
//! Scenario code asks a [`Metrics`] registry for handles up front and passes them into its
//! iterations. Handles are cheap to clone and record through atomics, so they can be shared by
//! every VU. The registry keeps one entry per name and summarizes all of them when a run ends.
use crate::error::MetricError;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;
use volley_core::{
    CounterSummary, MetricKind, MetricSummary, RateSummary, TrendRecorder, TrendSummary, HTTP_REQS,
    HTTP_REQ_DURATION, ITERATIONS, ITERATION_DURATION,
};

/// Ratio of `true` samples to all samples, e.g. the share of failed calls.
#[derive(Clone)]
pub struct Rate {
    name: Arc<str>,
    trues: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl Rate {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            trues: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, value: bool) {
        if value {
            self.trues.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.to_string(), "value" => if value { "true" } else { "false" })
            .increment(1);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> RateSummary {
        let total = self.total.load(Ordering::Relaxed);
        let trues = self.trues.load(Ordering::Relaxed);
        RateSummary::new(trues.min(total), total)
    }
}

/// Distribution of durations.
///
/// Samples are folded into a running aggregate as they arrive, so memory stays flat however
/// long the run is.
#[derive(Clone)]
pub struct Trend {
    name: Arc<str>,
    recorder: Arc<Mutex<TrendRecorder>>,
}

impl Trend {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            recorder: Arc::new(Mutex::new(TrendRecorder::default())),
        }
    }

    pub fn add(&self, value: Duration) {
        self.recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(value);

        #[cfg(feature = "metrics")]
        metrics::histogram!(self.name.to_string()).record(value.as_secs_f64());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> TrendSummary {
        self.recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

/// Monotonic count.
#[derive(Clone)]
pub struct Counter {
    name: Arc<str>,
    value: Arc<AtomicU64>,
}

impl Counter {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!(self.name.to_string()).increment(n);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
enum Metric {
    Counter(Counter),
    Rate(Rate),
    Trend(Trend),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    fn summary(&self, elapsed: Duration) -> MetricSummary {
        match self {
            Metric::Counter(c) => MetricSummary::Counter(CounterSummary::new(c.get(), elapsed)),
            Metric::Rate(r) => MetricSummary::Rate(r.summary()),
            Metric::Trend(t) => MetricSummary::Trend(t.summary()),
        }
    }
}

/// Registry of every metric a run records into.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Mutex<BTreeMap<String, Metric>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rate called `name`, registering it on first use.
    pub fn rate(&self, name: &str) -> Result<Rate, MetricError> {
        match self.get_or_insert(name, MetricKind::Rate, || Metric::Rate(Rate::new(name)))? {
            Metric::Rate(rate) => Ok(rate),
            _ => unreachable!(),
        }
    }

    /// Returns the trend called `name`, registering it on first use.
    pub fn trend(&self, name: &str) -> Result<Trend, MetricError> {
        match self.get_or_insert(name, MetricKind::Trend, || Metric::Trend(Trend::new(name)))? {
            Metric::Trend(trend) => Ok(trend),
            _ => unreachable!(),
        }
    }

    /// Returns the counter called `name`, registering it on first use.
    pub fn counter(&self, name: &str) -> Result<Counter, MetricError> {
        match self.get_or_insert(name, MetricKind::Counter, || {
            Metric::Counter(Counter::new(name))
        })? {
            Metric::Counter(counter) => Ok(counter),
            _ => unreachable!(),
        }
    }

    /// Kind of the metric called `name`, if registered.
    pub fn kind(&self, name: &str) -> Result<Option<MetricKind>, MetricError> {
        Ok(self.inner.lock()?.get(name).map(Metric::kind))
    }

    pub fn summaries(&self, elapsed: Duration) -> Result<BTreeMap<String, MetricSummary>, MetricError> {
        // NOTE: Clone the handles out so summarizing large trends happens outside the lock.
        let metrics: Vec<(String, Metric)> = self
            .inner
            .lock()?
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();

        Ok(metrics
            .into_iter()
            .map(|(name, metric)| (name, metric.summary(elapsed)))
            .collect())
    }

    fn get_or_insert(
        &self,
        name: &str,
        requested: MetricKind,
        make: impl FnOnce() -> Metric,
    ) -> Result<Metric, MetricError> {
        let mut inner = self.inner.lock()?;
        let metric = inner.entry(name.to_string()).or_insert_with(make);

        if metric.kind() != requested {
            return Err(MetricError::KindMismatch {
                name: name.to_string(),
                existing: metric.kind(),
                requested,
            });
        }
        Ok(metric.clone())
    }
}

/// Metrics every run records regardless of the scenario.
#[derive(Clone)]
pub(crate) struct Builtins {
    pub http_reqs: Counter,
    pub http_req_duration: Trend,
    pub iterations: Counter,
    pub iteration_duration: Trend,
}

impl Builtins {
    pub fn register(metrics: &Metrics) -> Result<Self, MetricError> {
        Ok(Self {
            http_reqs: metrics.counter(HTTP_REQS)?,
            http_req_duration: metrics.trend(HTTP_REQ_DURATION)?,
            iterations: metrics.counter(ITERATIONS)?,
            iteration_duration: metrics.trend(ITERATION_DURATION)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_share_of_true_samples() {
        let metrics = Metrics::new();
        let rate = metrics.rate("failed calls").unwrap();

        rate.add(true);
        rate.add(false);
        rate.add(false);
        rate.add(false);

        let summary = rate.summary();
        assert_eq!(summary.rate, 0.25);
        assert_eq!(summary.passes, 1);
        assert_eq!(summary.fails, 3);
    }

    #[test]
    fn handles_share_state_by_name() {
        let metrics = Metrics::new();
        let a = metrics.counter("hits").unwrap();
        let b = metrics.counter("hits").unwrap();

        a.add(2);
        b.add(3);
        assert_eq!(a.get(), 5);
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let metrics = Metrics::new();
        metrics.rate("latency").unwrap();

        let err = metrics.trend("latency").err().unwrap();
        assert!(matches!(
            err,
            MetricError::KindMismatch {
                existing: MetricKind::Rate,
                requested: MetricKind::Trend,
                ..
            }
        ));
        assert_eq!(metrics.kind("latency").unwrap(), Some(MetricKind::Rate));
        assert_eq!(metrics.kind("missing").unwrap(), None);
    }

    #[test]
    fn trend_handles_aggregate_across_threads() {
        let metrics = Metrics::new();
        let trend = metrics.trend("latency").unwrap();

        let workers: Vec<_> = (1..=4u64)
            .map(|worker| {
                let trend = trend.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        trend.add(Duration::from_millis(worker));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let summary = metrics.trend("latency").unwrap().summary();
        assert_eq!(summary.count, 40_000);
        assert_eq!(summary.min, Duration::from_millis(1));
        assert_eq!(summary.max, Duration::from_millis(4));
    }

    #[test]
    fn summaries_cover_every_metric() {
        let metrics = Metrics::new();
        metrics.rate("r").unwrap().add(true);
        metrics.trend("t").unwrap().add(Duration::from_millis(5));
        metrics.counter("c").unwrap().add(10);

        let summaries = metrics.summaries(Duration::from_secs(5)).unwrap();
        assert_eq!(summaries.len(), 3);
        assert!(matches!(summaries["r"], MetricSummary::Rate(RateSummary { rate, .. }) if rate == 1.));
        assert!(matches!(summaries["c"], MetricSummary::Counter(CounterSummary { count: 10, rate }) if rate == 2.));
        match &summaries["t"] {
            MetricSummary::Trend(trend) => assert_eq!(trend.max, Duration::from_millis(5)),
            other => panic!("unexpected summary {other:?}"),
        }
    }
}
