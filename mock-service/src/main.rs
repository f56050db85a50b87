use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::{tps_measure_task, Fault, MockService};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// In-memory domain events service to point load tests at.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Delay added to every response, e.g. `20ms`.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0ms")]
    delay: Duration,

    /// Answer an endpoint with a fixed status, e.g. `bounced=500`. Repeatable.
    #[arg(long = "fail")]
    faults: Vec<Fault>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    prometheus: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=info,tower_http=info")),
        )
        .init();

    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
    }

    let service = MockService::new();
    service.set_delay(args.delay);
    for fault in args.faults {
        service.fail(fault);
    }

    tokio::spawn(tps_measure_task(service.clone()));

    service.run(args.addr).await?;
    Ok(())
}
