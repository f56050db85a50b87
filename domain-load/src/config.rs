//! Command line and options document.
use crate::error::LoadError;
use crate::scenario::{options, DEFAULT_BASE_URL};
use clap::Parser;
use serde_json::Value;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use volley_core::{RunConfig, RunStatistics};

/// Drive delivered, bounced and get-domain traffic at the domain events service.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Concurrent virtual users.
    #[arg(long)]
    pub vus: Option<NonZeroUsize>,

    /// Length of the run, e.g. `60s` or `2m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Total iterations shared by all VUs.
    #[arg(long)]
    pub iterations: Option<NonZeroU64>,

    /// Pause at the end of each iteration.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub idle: Duration,

    /// Cap on requests per second across all VUs.
    #[arg(long)]
    pub max_rps: Option<NonZeroU32>,

    /// Per-request timeout. A timed out call counts as failed.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub timeout: Duration,

    /// JSON options document overriding the built-in options key by key.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the end-of-run summary as JSON to this file.
    #[arg(long)]
    pub summary_export: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while running.
    #[arg(long)]
    pub prometheus: Option<SocketAddr>,
}

impl Cli {
    /// Built-in options, then the options document, then command line flags.
    pub fn run_config(&self) -> Result<RunConfig, LoadError> {
        let mut config = match &self.config {
            Some(path) => {
                let document = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                overlay(options(), &document)?
            }
            None => options(),
        };

        if let Some(vus) = self.vus {
            config.vus = vus;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = Some(iterations);
        }
        if let Some(max_rps) = self.max_rps {
            config.max_rps = Some(max_rps);
        }

        debug!("Resolved options {config:?}");
        Ok(config)
    }
}

/// Replaces top-level keys of `base` with those present in the JSON `document`.
pub fn overlay(base: RunConfig, document: &str) -> Result<RunConfig, LoadError> {
    let overrides: Value = serde_json::from_str(document)?;
    let mut merged = serde_json::to_value(base)?;

    if let (Value::Object(merged), Value::Object(overrides)) = (&mut merged, overrides) {
        merged.extend(overrides);
    }
    Ok(serde_json::from_value(merged)?)
}

pub fn export_summary(stats: &RunStatistics, path: &Path) -> Result<(), LoadError> {
    let json = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, json).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}
