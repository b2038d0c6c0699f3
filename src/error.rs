use std::{future::Future, time::Duration};

use thiserror::Error;

/// Failure of an external collaborator: the model, the video search or the
/// image generator.
#[derive(Debug, Error)]
pub(crate) enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream answered with status {0}")]
    Status(u16),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
    #[error("{0} is not configured")]
    Unconfigured(&'static str),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            UpstreamError::Status(status.as_u16())
        } else if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Why a component served its fallback value instead of a real result.
#[derive(Debug, Error)]
pub(crate) enum FallbackReason {
    #[error("input is empty")]
    EmptyInput,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("every candidate was excluded")]
    Exhausted,
}

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("home directory not found: {0}")]
    NoHome(String),
}

pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(limit)),
    }
}
