use std::sync::PoisonError;
use thiserror::Error;
use volley_core::{MetricKind, ThresholdExpr};

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Metric \"{name}\" is already registered as a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("Metric registry mutex is poisoned.")]
    PoisonData,
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Threshold references unknown metric \"{0}\"")]
    UnknownMetric(String),

    #[error("Threshold \"{expr}\" does not apply to {kind} metric \"{metric}\"")]
    Inapplicable {
        metric: String,
        expr: ThresholdExpr,
        kind: MetricKind,
    },

    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),
}
