use metrics_util::Summary;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// The kind of a named metric. Decides which threshold aggregations apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        };
        f.write_str(name)
    }
}

/// End-of-run aggregate of a single metric.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    Counter(CounterSummary),
    Rate(RateSummary),
    Trend(TrendSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter(_) => MetricKind::Counter,
            MetricSummary::Rate(_) => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSummary::Counter(c) => write!(f, "{} {:.2}/s", c.count, c.rate),
            MetricSummary::Rate(r) => write!(
                f,
                "{:.2}% ({} of {})",
                r.rate * 100.,
                r.passes,
                r.passes + r.fails
            ),
            MetricSummary::Trend(t) => write!(
                f,
                "avg={:?} min={:?} med={:?} max={:?} p(90)={:?} p(95)={:?}",
                t.avg, t.min, t.med, t.max, t.p90, t.p95
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CounterSummary {
    pub count: u64,
    /// Count per second of elapsed run time.
    pub rate: f64,
}

impl CounterSummary {
    pub fn new(count: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0. { count as f64 / secs } else { 0. };
        Self { count, rate }
    }
}

/// `passes` counts `true` samples, `fails` counts `false` samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSummary {
    pub rate: f64,
    pub passes: u64,
    pub fails: u64,
}

impl RateSummary {
    pub fn new(passes: u64, total: u64) -> Self {
        let rate = if total == 0 {
            0.
        } else {
            passes as f64 / total as f64
        };
        Self {
            rate,
            passes,
            fails: total.saturating_sub(passes),
        }
    }
}

/// Latency distribution. Quantiles come from a DDSketch so arbitrary `p(N)` thresholds can
/// be answered after the run.
#[derive(Clone, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    #[serde(serialize_with = "millis")]
    pub avg: Duration,
    #[serde(serialize_with = "millis")]
    pub min: Duration,
    #[serde(serialize_with = "millis")]
    pub med: Duration,
    #[serde(serialize_with = "millis")]
    pub max: Duration,
    #[serde(rename = "p(90)", serialize_with = "millis")]
    pub p90: Duration,
    #[serde(rename = "p(95)", serialize_with = "millis")]
    pub p95: Duration,
    #[serde(rename = "p(99)", serialize_with = "millis")]
    pub p99: Duration,
    #[serde(skip)]
    sketch: Summary,
}

/// Running aggregate of a trend. Keeps a bounded sketch instead of every sample.
#[derive(Clone)]
pub struct TrendRecorder {
    sketch: Summary,
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl Default for TrendRecorder {
    fn default() -> Self {
        Self {
            sketch: Summary::with_defaults(),
            count: 0,
            total: Duration::ZERO,
            min: None,
            max: Duration::ZERO,
        }
    }
}

impl TrendRecorder {
    pub fn add(&mut self, sample: Duration) {
        self.sketch.add(sample.as_secs_f64());
        self.count += 1;
        self.total = self.total.saturating_add(sample);
        self.min = Some(self.min.map_or(sample, |min| min.min(sample)));
        self.max = self.max.max(sample);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn summary(&self) -> TrendSummary {
        let avg = match self.count {
            0 => Duration::ZERO,
            n => Duration::from_secs_f64(self.total.as_secs_f64() / n as f64),
        };

        let mut summary = TrendSummary {
            count: self.count,
            avg,
            min: self.min.unwrap_or_default(),
            max: self.max,
            med: Duration::ZERO,
            p90: Duration::ZERO,
            p95: Duration::ZERO,
            p99: Duration::ZERO,
            sketch: self.sketch.clone(),
        };
        summary.med = summary.percentile(50.);
        summary.p90 = summary.percentile(90.);
        summary.p95 = summary.percentile(95.);
        summary.p99 = summary.percentile(99.);
        summary
    }
}

impl TrendSummary {
    pub fn from_samples(samples: &[Duration]) -> Self {
        let mut recorder = TrendRecorder::default();
        for sample in samples {
            recorder.add(*sample);
        }
        recorder.summary()
    }

    /// Latency at percentile `p` (0 to 100). Zero for an empty trend.
    pub fn percentile(&self, p: f64) -> Duration {
        match self.sketch.quantile(p / 100.) {
            Some(secs) if secs.is_finite() && secs >= 0. => Duration::from_secs_f64(secs),
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Debug for TrendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendSummary")
            .field("count", &self.count)
            .field("avg", &self.avg)
            .field("min", &self.min)
            .field("med", &self.med)
            .field("max", &self.max)
            .field("p90", &self.p90)
            .field("p95", &self.p95)
            .field("p99", &self.p99)
            .finish()
    }
}

fn millis<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(dur.as_nanos() as f64 / 1e6)
}
