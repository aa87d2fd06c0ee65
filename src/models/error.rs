use thiserror::Error;

/// Why a fetch against the static-data service failed.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// No usable response: connection, DNS, timeout or body read failure.
    #[error("upstream unreachable: {0}")]
    Transport(String),
    /// A response arrived but reported failure.
    #[error("upstream returned status {status_code}: {message}")]
    Upstream { status_code: u16, message: String },
    /// A success response whose body lacks what the route serves.
    #[error("upstream response malformed: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Upstream { .. } | FetchError::Malformed(_) => "upstream",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key.
        let err = err.without_url();
        if err.is_timeout() {
            FetchError::Transport(format!("request timed out: {}", err))
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
