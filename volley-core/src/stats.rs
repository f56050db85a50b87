use crate::{MetricSummary, ThresholdExpr};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Statistics of a finished scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub name: String,
    pub vus: usize,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub iterations: u64,
    /// VUs whose iteration was still running after the graceful stop period.
    pub interrupted: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunStatistics {
    /// True if every threshold held.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// Ratio of a rate metric, if `name` is one.
    pub fn rate(&self, name: &str) -> Option<f64> {
        match self.metric(name)? {
            MetricSummary::Rate(rate) => Some(rate.rate),
            _ => None,
        }
    }

    /// Value of a counter metric, if `name` is one.
    pub fn count(&self, name: &str) -> Option<u64> {
        match self.metric(name)? {
            MetricSummary::Counter(counter) => Some(counter.count),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario {}: {} iterations, {} VUs, {}",
            self.name,
            self.iterations,
            self.vus,
            humantime::format_duration(round_to_millis(self.elapsed)),
        )?;
        if self.interrupted > 0 {
            writeln!(f, "  {} iterations interrupted", self.interrupted)?;
        }

        for (name, summary) in &self.metrics {
            writeln!(f, "  {:.<40}: {summary}", format!("{name} "))?;
        }

        if !self.thresholds.is_empty() {
            writeln!(f, "thresholds:")?;
            for outcome in &self.thresholds {
                writeln!(f, "  {outcome}")?;
            }
        }
        Ok(())
    }
}

/// Result of checking one threshold expression after the run.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    #[serde_as(as = "DisplayFromStr")]
    pub expr: ThresholdExpr,
    pub observed: f64,
    pub passed: bool,
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "pass" } else { "FAIL" };
        write!(
            f,
            "[{mark}] {} {} (observed {:.4})",
            self.metric, self.expr, self.observed
        )
    }
}

fn round_to_millis(dur: Duration) -> Duration {
    Duration::from_millis(dur.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CounterSummary, RateSummary};

    fn stats(passed: bool) -> RunStatistics {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "failed bounced calls".to_string(),
            MetricSummary::Rate(RateSummary::new(1, 4)),
        );
        metrics.insert(
            "iterations".to_string(),
            MetricSummary::Counter(CounterSummary::new(4, Duration::from_secs(2))),
        );

        RunStatistics {
            name: "unit".to_string(),
            vus: 2,
            elapsed: Duration::from_millis(2_000),
            iterations: 4,
            interrupted: 0,
            metrics,
            thresholds: vec![ThresholdOutcome {
                metric: "failed bounced calls".to_string(),
                expr: "rate<0.1".parse().unwrap(),
                observed: 0.25,
                passed,
            }],
        }
    }

    #[test]
    fn lookups_by_kind() {
        let stats = stats(false);
        assert_eq!(stats.rate("failed bounced calls"), Some(0.25));
        assert_eq!(stats.rate("iterations"), None);
        assert_eq!(stats.count("iterations"), Some(4));
        assert_eq!(stats.count("missing"), None);
    }

    #[test]
    fn passed_requires_every_threshold() {
        assert!(!stats(false).passed());
        assert!(stats(true).passed());
    }

    #[test]
    fn report_lists_metrics_and_thresholds() {
        let report = stats(false).to_string();
        assert!(report.contains("scenario unit: 4 iterations, 2 VUs, 2s"));
        assert!(report.contains("failed bounced calls ...."));
        assert!(report.contains("25.00% (1 of 4)"));
        assert!(report.contains("[FAIL] failed bounced calls rate<0.1 (observed 0.2500)"));
    }
}
