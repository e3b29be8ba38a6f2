pub mod chess_com;
pub mod lichess;
pub mod llm;
pub mod rate_limiter;

use std::sync::Arc;
use std::time::Duration;

use chess_core::Game;
use reqwest::{Client, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request was discarded from the rate limiter queue before it ran.
    #[error("Request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Transport failures, throttling and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Status(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// An import that failed part way; games collected before the failure are
/// kept.
#[derive(Debug, thiserror::Error)]
#[error("Import stopped after {} games: {source}", partial.len())]
pub struct ImportError {
    pub source: ClientError,
    pub partial: Vec<Game>,
}

impl ImportError {
    pub fn new(source: ClientError, partial: Vec<Game>) -> Self {
        Self { source, partial }
    }
}

/// Called with `(loaded, max)` as games arrive.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub(crate) fn http_client(timeout: Duration) -> Result<Client, ClientError> {
    Ok(Client::builder()
        .user_agent("ChessCoach/1.0")
        .timeout(timeout)
        .build()?)
}

/// Map a response status onto the client error taxonomy.
pub(crate) fn check_status(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("{what} not found")));
    }
    if !status.is_success() {
        return Err(ClientError::Status(status));
    }
    Ok(resp)
}
