use crate::call::{Call, FailureRates, Target, FAILED_BOUNCED, FAILED_DELIVERED, FAILED_GET_DOMAIN};
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::time::Duration;
use volley::{ConfigurableScenario, Metrics, Scenario};
use volley_core::{Aggregation, Operator, RunConfig, ThresholdExpr, HTTP_REQ_DURATION};

pub const SCENARIO_NAME: &str = "domain events";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_VUS: usize = 100;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
/// Pause at the end of every iteration.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(1);

pub type Iteration = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The workload each VU repeats.
#[derive(Clone)]
pub struct DomainEvents {
    target: Target,
    rates: FailureRates,
    idle: Duration,
}

impl DomainEvents {
    pub fn new(target: Target, rates: FailureRates, idle: Duration) -> Self {
        Self {
            target,
            rates,
            idle,
        }
    }

    /// Issues delivered, bounced and get-domain in order, then idles.
    ///
    /// A failed call does not stop the ones after it. Returns which calls failed.
    pub async fn iteration(&self) -> [bool; 3] {
        let mut failed = [false; 3];
        for (i, call) in Call::ALL.into_iter().enumerate() {
            failed[i] = call.issue(&self.target, &self.rates).await;
        }

        if !self.idle.is_zero() {
            tokio::time::sleep(self.idle).await;
        }
        failed
    }
}

/// 100 VUs for 60s, failing when more than 10% of any call fails or the 95th percentile of
/// request latency reaches 200ms.
pub fn options() -> RunConfig {
    let mut config = RunConfig::new(SCENARIO_NAME);
    config.vus = NonZeroUsize::new(DEFAULT_VUS).unwrap_or(config.vus);
    config.duration = DEFAULT_DURATION;

    let failure_rate = ThresholdExpr {
        aggregation: Aggregation::Rate,
        op: Operator::Lt,
        value: 0.1,
    };
    for metric in [FAILED_DELIVERED, FAILED_BOUNCED, FAILED_GET_DOMAIN] {
        config.add_threshold(metric, failure_rate);
    }

    config.add_threshold(
        HTTP_REQ_DURATION,
        ThresholdExpr {
            aggregation: Aggregation::Percentile(95.),
            op: Operator::Lt,
            value: 200.,
        },
    );
    config
}

/// The domain events scenario configured with [`options`].
pub fn scenario(
    metrics: &Metrics,
    workload: DomainEvents,
) -> Scenario<impl Fn() -> Iteration + Clone + Send + Sync + 'static> {
    Scenario::new(SCENARIO_NAME, metrics.clone(), move || -> Iteration {
        let workload = workload.clone();
        Box::pin(async move {
            workload.iteration().await;
        })
    })
    .config(options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock_service::{Endpoint, MockService};
    use std::num::NonZeroU64;

    async fn workload(service: &MockService, metrics: &Metrics) -> DomainEvents {
        let addr = service.spawn().await.unwrap();
        let target = Target::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        DomainEvents::new(
            target,
            FailureRates::register(metrics).unwrap(),
            Duration::ZERO,
        )
    }

    #[test]
    fn default_options() {
        let config = options();
        assert_eq!(config.name, SCENARIO_NAME);
        assert_eq!(config.vus.get(), 100);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.iterations, None);

        let thresholds: Vec<(String, String)> = config
            .thresholds
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(|e| (metric.clone(), e.to_string())))
            .collect();
        assert_eq!(thresholds.len(), 4);
        for metric in [FAILED_DELIVERED, FAILED_BOUNCED, FAILED_GET_DOMAIN] {
            assert!(thresholds.contains(&(metric.to_string(), "rate<0.1".to_string())));
        }
        assert!(thresholds.contains(&("http_req_duration".to_string(), "p(95)<200".to_string())));
    }

    #[tokio::test]
    async fn iteration_issues_three_calls() {
        let service = MockService::new();
        let workload = workload(&service, &Metrics::new()).await;

        assert_eq!(workload.iteration().await, [false, false, false]);
        for endpoint in Endpoint::ALL {
            assert_eq!(service.hits(endpoint), 1);
        }
    }

    #[tokio::test]
    async fn iteration_continues_after_failures() {
        let service = MockService::new();
        for endpoint in ["delivered", "bounced", "get-domain"] {
            service.fail(format!("{endpoint}=503").parse().unwrap());
        }
        let workload = workload(&service, &Metrics::new()).await;

        assert_eq!(workload.iteration().await, [true, true, true]);
        for endpoint in Endpoint::ALL {
            assert_eq!(service.hits(endpoint), 1);
        }
    }

    #[tokio::test]
    async fn iteration_idles_at_the_end() {
        let service = MockService::new();
        let mut workload = workload(&service, &Metrics::new()).await;
        workload.idle = Duration::from_millis(100);

        let start = tokio::time::Instant::now();
        workload.iteration().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn scenario_runs_against_the_service() {
        let service = MockService::new();
        let metrics = Metrics::new();
        let workload = workload(&service, &metrics).await;

        let stats = scenario(&metrics, workload)
            .vus(NonZeroUsize::new(2).unwrap())
            .iterations(NonZeroU64::new(10).unwrap())
            .await
            .unwrap();

        assert_eq!(stats.name, SCENARIO_NAME);
        assert_eq!(stats.iterations, 10);
        assert_eq!(stats.count("http_reqs"), Some(30));
        assert_eq!(stats.rate(FAILED_DELIVERED), Some(0.));
        assert_eq!(stats.rate(FAILED_BOUNCED), Some(0.));
        assert_eq!(stats.rate(FAILED_GET_DOMAIN), Some(0.));
        assert_eq!(stats.thresholds.len(), 4);
        assert_eq!(service.hits(Endpoint::Bounced), 10);
    }
}
