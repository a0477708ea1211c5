use thiserror::Error;

/// Coarse origin of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The gateway could not be reached or the connection dropped.
    Connectivity,
    /// The gateway answered, but reported a failure.
    Server,
}

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(String),

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Server reported error: {0}")]
    ServerReported(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<reqwest_middleware::Error> for LLMError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => LLMError::Http(e),
            reqwest_middleware::Error::Middleware(e) => LLMError::Middleware(e.to_string()),
        }
    }
}

impl LLMError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LLMError::Http(_) | LLMError::Middleware(_) | LLMError::Stream(_) => {
                FailureKind::Connectivity
            }
            LLMError::Api { .. } | LLMError::ServerReported(_) | LLMError::Json(_) => {
                FailureKind::Server
            }
        }
    }

    /// Hint for the caller; this crate never retries once a stream is open.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::Http(_) | LLMError::Middleware(_) | LLMError::Stream(_) => true,
            LLMError::Api { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            LLMError::ServerReported(_) | LLMError::Json(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
