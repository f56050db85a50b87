use anyhow::Result;
use clap::Parser;
use domain_load::{
    config::export_summary, scenario, Cli, DomainEvents, FailureRates, Target,
    THRESHOLDS_FAILED_EXIT_CODE,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use volley::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("volley=info,domain_load=info")),
        )
        .init();

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Serving Prometheus metrics on {addr}");
    }

    let config = cli.run_config()?;
    let metrics = Metrics::new();
    let workload = DomainEvents::new(
        Target::new(&cli.base_url, cli.timeout)?,
        FailureRates::register(&metrics)?,
        cli.idle,
    );

    info!("Targeting {}", cli.base_url);
    let stats = scenario(&metrics, workload).config(config).await?;
    println!("{stats}");

    if let Some(path) = &cli.summary_export {
        export_summary(&stats, path)?;
        info!("Summary written to {}", path.display());
    }

    if !stats.passed() {
        error!("Some thresholds have failed");
        std::process::exit(THRESHOLDS_FAILED_EXIT_CODE);
    }
    Ok(())
}
