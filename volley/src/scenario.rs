//! Scenario logic
use crate::error::ScenarioError;
use crate::metric::{Builtins, Metrics, Trend};
use crate::progress::{deadline_after, Progress};
use crate::transaction::TransactionData;
use crate::vu::VuPool;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{BTreeMap, HashMap};
use std::{
    future::Future,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::{sleep_until, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use volley_core::{
    split_submetric, MetricSummary, RunConfig, RunStatistics, ThresholdExpr, ThresholdOutcome,
    HTTP_REQ_DURATION, PROGRESS_INTERVAL,
};

type RunnerFuture = Pin<Box<dyn Future<Output = Result<RunStatistics, ScenarioError>> + Send>>;

/// Load test scenario
///
/// Built from a workload function which is invoked once per VU iteration. Awaiting the scenario
/// runs it with its [`RunConfig`] and resolves to the run's statistics.
///
/// Metric handles the workload records into come from the same [`Metrics`] registry the
/// scenario is built with, which is also where thresholds look their metrics up.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<RunnerFuture>,
    config: RunConfig,
    metrics: Metrics,
}

impl<T> Scenario<T> {
    pub fn new(name: &str, metrics: Metrics, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: RunConfig::new(name),
            metrics,
        }
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.config
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = Result<RunStatistics, ScenarioError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            let metrics = this.metrics.clone();
            Box::pin(async move { run_scenario(func, config, metrics).await })
        });

        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn vus(self, vus: NonZeroUsize) -> Self;
    fn duration(self, duration: Duration) -> Self;
    fn iterations(self, iterations: NonZeroU64) -> Self;
    fn max_rps(self, max_rps: NonZeroU32) -> Self;
    fn graceful_stop(self, grace: Duration) -> Self;
    fn threshold(self, metric: &str, expr: ThresholdExpr) -> Self;
    fn config(self, config: RunConfig) -> Self;
}

impl<T, F> ConfigurableScenario<Result<RunStatistics, ScenarioError>> for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    /// Run the scenario with the given number of concurrent virtual users.
    fn vus(mut self, vus: NonZeroUsize) -> Self {
        self.config.vus = vus;
        self
    }

    /// Run the scenario for (at most) the given duration.
    fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    /// Stop once this many iterations, shared across all VUs, have started.
    ///
    /// NOTE: The duration still applies as an upper bound.
    fn iterations(mut self, iterations: NonZeroU64) -> Self {
        self.config.iterations = Some(iterations);
        self
    }

    /// Limit the transactions per second issued across all VUs.
    fn max_rps(mut self, max_rps: NonZeroU32) -> Self {
        self.config.max_rps = Some(max_rps);
        self
    }

    /// How long running iterations may continue after the duration has elapsed.
    fn graceful_stop(mut self, grace: Duration) -> Self {
        self.config.graceful_stop = grace;
        self
    }

    /// Fail the run unless `expr` holds for `metric` at the end.
    ///
    /// # Example
    /// ```no_run
    /// use volley::prelude::*;
    ///
    /// # async fn run() {
    /// let metrics = Metrics::new();
    /// let stats = Scenario::new("thresholds", metrics, || async {})
    ///     .threshold("http_req_duration", "p(95)<200".parse().unwrap())
    ///     .threshold("http_req_duration{name:Login}", "max<1000".parse().unwrap())
    ///     .await;
    /// # }
    /// ```
    fn threshold(mut self, metric: &str, expr: ThresholdExpr) -> Self {
        self.config.add_threshold(metric, expr);
        self
    }

    /// Replace every option at once, keeping the scenario's name.
    fn config(mut self, config: RunConfig) -> Self {
        let name = std::mem::take(&mut self.config.name);
        self.config = RunConfig { name, ..config };
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=config.name))]
pub(crate) async fn run_scenario<T, F>(
    scenario: T,
    config: RunConfig,
    metrics: Metrics,
) -> Result<RunStatistics, ScenarioError>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    info!("Running {} with config {:?}", config.name, &config);

    let builtins = Builtins::register(&metrics)?;
    let tagged = tagged_trends(&config, &metrics)?;
    check_thresholds(&config, &metrics)?;

    let hook = TransactionData {
        limiter: config.max_rps.map(|rps| Arc::new(rate_limiter(rps))),
        requests: builtins.http_reqs.clone(),
        duration: builtins.http_req_duration.clone(),
        tagged: Arc::new(tagged),
    };

    let start = Instant::now();
    let deadline = deadline_after(start, config.duration);

    let mut vus = VuPool::new(scenario, hook, builtins.clone(), config.iterations);
    vus.spawn(config.vus.get());

    let mut progress = Progress::new(PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                debug!("Duration of {:?} reached", config.duration);
                break;
            }
            res = vus.join_next() => {
                if res.is_none() {
                    debug!("Every VU has finished");
                    break;
                }
            }
            elapsed = progress.tick() => {
                let iterations = builtins.iterations.get();
                info!(
                    "{} running VUs, {} complete iterations ({:.1}/s), {} elapsed",
                    vus.running(),
                    iterations,
                    progress.rate(iterations, elapsed),
                    humantime::format_duration(Duration::from_secs(start.elapsed().as_secs())),
                );
            }
        }
    }

    let interrupted = vus.shutdown(config.graceful_stop).await;
    let elapsed = start.elapsed();

    let summaries = metrics.summaries(elapsed)?;
    let thresholds = evaluate_thresholds(&config, &summaries);
    for outcome in thresholds.iter().filter(|t| !t.passed) {
        warn!("Threshold crossed: {outcome}");
    }

    info!("Scenario complete");

    Ok(RunStatistics {
        name: config.name.clone(),
        vus: config.vus.get(),
        elapsed,
        iterations: builtins.iterations.get(),
        interrupted,
        metrics: summaries,
        thresholds,
    })
}

/// Per-tag latency trends for thresholds keyed like `http_req_duration{name:Delivered}`.
fn tagged_trends(
    config: &RunConfig,
    metrics: &Metrics,
) -> Result<HashMap<String, Trend>, ScenarioError> {
    let mut tagged = HashMap::new();
    for key in config.thresholds.keys() {
        if let (HTTP_REQ_DURATION, Some(tag)) = split_submetric(key) {
            tagged.insert(tag.to_string(), metrics.trend(key)?);
        }
    }
    Ok(tagged)
}

fn check_thresholds(config: &RunConfig, metrics: &Metrics) -> Result<(), ScenarioError> {
    for (metric, exprs) in &config.thresholds {
        let kind = metrics
            .kind(metric)?
            .ok_or_else(|| ScenarioError::UnknownMetric(metric.clone()))?;

        if let Some(expr) = exprs.iter().find(|e| !e.aggregation.applies_to(kind)) {
            return Err(ScenarioError::Inapplicable {
                metric: metric.clone(),
                expr: *expr,
                kind,
            });
        }
    }
    Ok(())
}

fn evaluate_thresholds(
    config: &RunConfig,
    summaries: &BTreeMap<String, MetricSummary>,
) -> Vec<ThresholdOutcome> {
    let mut outcomes = vec![];
    for (metric, exprs) in &config.thresholds {
        let Some(summary) = summaries.get(metric) else {
            error!("No summary for threshold metric {metric}");
            continue;
        };

        for expr in exprs {
            let (observed, passed) = expr.evaluate(summary).unwrap_or((f64::NAN, false));
            outcomes.push(ThresholdOutcome {
                metric: metric.clone(),
                expr: *expr,
                observed,
                passed,
            });
        }
    }
    outcomes
}

fn rate_limiter(max_rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_rps).allow_burst(NonZeroU32::MIN))
}
