mod utils;
#[allow(unused)]
use utils::*;

use domain_load::{
    call::{FAILED_BOUNCED, FAILED_DELIVERED, FAILED_GET_DOMAIN},
    config::export_summary,
    scenario,
};
use mock_service::Endpoint;
use std::num::{NonZeroU64, NonZeroUsize};
use std::time::Duration;
use volley::prelude::*;

fn one_vu(iterations: u64) -> (NonZeroUsize, NonZeroU64) {
    (NonZeroUsize::MIN, NonZeroU64::new(iterations).unwrap())
}

#[tokio::test]
async fn healthy_service_passes_failure_thresholds() -> anyhow::Result<()> {
    init();
    let (service, addr) = service().await?;
    let metrics = Metrics::new();
    let (vus, iterations) = one_vu(20);

    let stats = scenario(&metrics, workload(&metrics, &format!("http://{addr}"))?)
        .vus(vus)
        .iterations(iterations)
        .await?;

    assert_eq!(stats.iterations, 20);
    assert_eq!(stats.rate(FAILED_DELIVERED), Some(0.));
    assert_eq!(stats.rate(FAILED_BOUNCED), Some(0.));
    assert_eq!(stats.rate(FAILED_GET_DOMAIN), Some(0.));
    for outcome in stats.thresholds.iter().filter(|t| t.metric.starts_with("failed")) {
        assert!(outcome.passed, "{outcome}");
    }

    for endpoint in Endpoint::ALL {
        assert_eq!(service.hits(endpoint), 20);
    }
    Ok(())
}

#[tokio::test]
async fn failing_endpoint_only_affects_its_rate() -> anyhow::Result<()> {
    init();
    let (service, addr) = service().await?;
    service.fail("bounced=500".parse()?);
    let metrics = Metrics::new();
    let (vus, iterations) = one_vu(10);

    let stats = scenario(&metrics, workload(&metrics, &format!("http://{addr}"))?)
        .vus(vus)
        .iterations(iterations)
        .await?;

    assert_eq!(stats.rate(FAILED_DELIVERED), Some(0.));
    assert_eq!(stats.rate(FAILED_BOUNCED), Some(1.));
    assert_eq!(stats.rate(FAILED_GET_DOMAIN), Some(0.));
    assert!(!stats.passed());

    let failed: Vec<&str> = stats
        .thresholds
        .iter()
        .filter(|t| !t.passed)
        .map(|t| t.metric.as_str())
        .collect();
    assert!(failed.contains(&FAILED_BOUNCED));
    assert!(!failed.contains(&FAILED_DELIVERED));
    assert!(!failed.contains(&FAILED_GET_DOMAIN));

    // Later calls of the iteration still went out.
    assert_eq!(service.hits(Endpoint::GetDomain), 10);
    Ok(())
}

#[tokio::test]
async fn unreachable_service_fails_every_call() -> anyhow::Result<()> {
    init();
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };
    let metrics = Metrics::new();
    let (vus, iterations) = one_vu(3);

    let stats = scenario(&metrics, workload(&metrics, &format!("http://{addr}"))?)
        .vus(vus)
        .iterations(iterations)
        .await?;

    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.rate(FAILED_DELIVERED), Some(1.));
    assert_eq!(stats.rate(FAILED_BOUNCED), Some(1.));
    assert_eq!(stats.rate(FAILED_GET_DOMAIN), Some(1.));
    assert_eq!(stats.count("http_reqs"), Some(9));
    assert!(!stats.passed());
    Ok(())
}

#[tokio::test]
async fn tagged_latency_threshold_and_summary_export() -> anyhow::Result<()> {
    init();
    let (service, addr) = service().await?;
    service.set_delay(Duration::from_millis(30));
    let metrics = Metrics::new();
    let (vus, iterations) = one_vu(4);

    let stats = scenario(&metrics, workload(&metrics, &format!("http://{addr}"))?)
        .vus(vus)
        .iterations(iterations)
        .threshold("http_req_duration{name:GetDomain}", "min>=30".parse()?)
        .await?;

    let outcome = stats
        .thresholds
        .iter()
        .find(|t| t.metric == "http_req_duration{name:GetDomain}")
        .expect("tagged threshold evaluated");
    assert!(outcome.passed, "{outcome}");

    let path = std::env::temp_dir().join(format!("domain-load-summary-{}.json", addr.port()));
    export_summary(&stats, &path)?;
    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    std::fs::remove_file(&path)?;

    assert_eq!(summary["iterations"], 4);
    assert_eq!(summary["metrics"][FAILED_BOUNCED]["type"], "rate");
    assert_eq!(summary["metrics"][FAILED_BOUNCED]["rate"], 0.0);
    assert_eq!(
        summary["metrics"]["http_req_duration{name:GetDomain}"]["count"],
        4
    );
    Ok(())
}

#[tokio::test]
async fn vus_share_the_iteration_budget() -> anyhow::Result<()> {
    init();
    let (service, addr) = service().await?;
    let metrics = Metrics::new();

    let stats = scenario(&metrics, workload(&metrics, &format!("http://{addr}"))?)
        .vus(NonZeroUsize::new(8).unwrap())
        .iterations(NonZeroU64::new(40).unwrap())
        .await?;

    assert_eq!(stats.iterations, 40);
    assert_eq!(service.hits(Endpoint::Delivered), 40);
    Ok(())
}
