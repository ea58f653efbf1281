use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to fetch one city from a weather provider.
///
/// These are recoverable at the batch level: the collector logs them and
/// moves on to the next city.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request did not complete: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("provider responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response is missing field `{0}`")]
    MissingField(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            // The request URL carries the API key in its query string.
            ProviderError::Transport(err.without_url())
        }
    }
}

/// Failure writing to (or reading from) the observation store. Fatal for a run.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a whole run, handed back to whoever scheduled it.
#[derive(Debug, Error)]
pub enum RunError {
    /// Provider or sink could not be set up from the configuration.
    #[error(transparent)]
    Setup(#[from] anyhow::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
