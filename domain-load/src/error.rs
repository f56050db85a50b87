use std::path::PathBuf;
use thiserror::Error;
use volley::MetricError;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid base URL `{url}`: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("Unable to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid options document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Metric(#[from] MetricError),
}
