use crate::{MetricKind, MetricSummary};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("Threshold \"{0}\" has no comparison operator")]
    MissingOperator(String),

    #[error("Unknown aggregation \"{0}\"")]
    Aggregation(String),

    #[error("Percentile must be between 0 and 100, got {0}")]
    Percentile(f64),

    #[error("Unknown comparison operator \"{0}\"")]
    Operator(String),

    #[error("Invalid threshold value \"{0}\"")]
    Value(String),
}

/// Statistic of a metric a threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
}

impl Aggregation {
    pub fn applies_to(&self, kind: MetricKind) -> bool {
        use Aggregation::*;
        match kind {
            MetricKind::Counter => matches!(self, Count | Rate),
            MetricKind::Rate => matches!(self, Rate),
            MetricKind::Trend => matches!(self, Avg | Min | Med | Max | Percentile(_)),
        }
    }

    /// Value of this aggregation for a summary, trends in milliseconds. `None` when the
    /// aggregation does not apply to the metric kind.
    pub fn observe(&self, summary: &MetricSummary) -> Option<f64> {
        let ms = |d: std::time::Duration| d.as_nanos() as f64 / 1e6;
        match (self, summary) {
            (Aggregation::Count, MetricSummary::Counter(c)) => Some(c.count as f64),
            (Aggregation::Rate, MetricSummary::Counter(c)) => Some(c.rate),
            (Aggregation::Rate, MetricSummary::Rate(r)) => Some(r.rate),
            (Aggregation::Avg, MetricSummary::Trend(t)) => Some(ms(t.avg)),
            (Aggregation::Min, MetricSummary::Trend(t)) => Some(ms(t.min)),
            (Aggregation::Med, MetricSummary::Trend(t)) => Some(ms(t.med)),
            (Aggregation::Max, MetricSummary::Trend(t)) => Some(ms(t.max)),
            (Aggregation::Percentile(p), MetricSummary::Trend(t)) => Some(ms(t.percentile(*p))),
            _ => None,
        }
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let agg = match s {
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "med" => Aggregation::Med,
            "max" => Aggregation::Max,
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdError::Aggregation(s.to_string()))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| ThresholdError::Aggregation(s.to_string()))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(ThresholdError::Percentile(p));
                }
                Aggregation::Percentile(p)
            }
        };
        Ok(agg)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Operator::Lt => observed < limit,
            Operator::Le => observed <= limit,
            Operator::Gt => observed > limit,
            Operator::Ge => observed >= limit,
            Operator::Eq => observed == limit,
            Operator::Ne => observed != limit,
        }
    }
}

impl FromStr for Operator {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "==" | "===" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            _ => Err(ThresholdError::Operator(s.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        };
        f.write_str(op)
    }
}

/// A pass/fail criterion on one metric, written as `<aggregation><op><value>`, e.g.
/// `rate<0.1` or `p(95)<200`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub op: Operator,
    pub value: f64,
}

impl ThresholdExpr {
    /// Observed value and whether the threshold holds for it.
    pub fn evaluate(&self, summary: &MetricSummary) -> Option<(f64, bool)> {
        let observed = self.aggregation.observe(summary)?;
        Some((observed, self.op.holds(observed, self.value)))
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!')
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let start = s
            .find(is_operator_char)
            .ok_or_else(|| ThresholdError::MissingOperator(s.to_string()))?;
        let (aggregation, rest) = s.split_at(start);
        let end = rest
            .find(|c: char| !is_operator_char(c))
            .unwrap_or(rest.len());
        let (op, value) = rest.split_at(end);

        let value = value.trim();
        Ok(Self {
            aggregation: aggregation.trim().parse()?,
            op: op.parse()?,
            value: value
                .parse()
                .map_err(|_| ThresholdError::Value(value.to_string()))?,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.op, self.value)
    }
}

/// Splits a threshold key such as `http_req_duration{name:Delivered}` into the metric name
/// and the value of its `name` tag.
pub fn split_submetric(key: &str) -> (&str, Option<&str>) {
    let Some((metric, tags)) = key.split_once('{') else {
        return (key, None);
    };

    let tag = tags
        .strip_suffix('}')
        .and_then(|tags| tags.split_once(':'))
        .filter(|(tag, _)| tag.trim() == "name")
        .map(|(_, value)| value.trim());

    (metric.trim(), tag)
}
