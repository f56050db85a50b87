use domain_load::{DomainEvents, FailureRates, Target};
use mock_service::MockService;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;
use volley::Metrics;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("volley=debug,domain_load=info,mock_service=info")
            .with_test_writer()
            .try_init();
    });
}

/// Mock service on an ephemeral port.
#[allow(unused)]
pub async fn service() -> anyhow::Result<(MockService, SocketAddr)> {
    let service = MockService::new();
    let addr = service.spawn().await?;
    Ok((service, addr))
}

/// Workload against `base_url` with no idle period and a short client timeout.
#[allow(unused)]
pub fn workload(metrics: &Metrics, base_url: &str) -> anyhow::Result<DomainEvents> {
    Ok(DomainEvents::new(
        Target::new(base_url, Duration::from_secs(2))?,
        FailureRates::register(metrics)?,
        Duration::ZERO,
    ))
}
