use thiserror::Error;

/// Unified error type for the Shepherd application
#[derive(Error, Debug)]
pub enum ShepherdError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("No sources configured")]
    NoSources,

    // Snapshot errors
    #[error("Snapshot not found at {path} (run `update` or `rebuild` first)")]
    MissingSnapshot { path: String },

    #[error("Snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("Failed to persist snapshot: {0}")]
    Persistence(String),

    // Source errors
    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    // Probe errors
    #[error("Proxy connection failed: {0}")]
    ProxyConnectionFailed(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Operation timed out")]
    Timeout,

    // Rotation errors
    #[error("No proxies available")]
    NoProxiesAvailable,

    #[error("Proxy not found: {0}")]
    ProxyNotFound(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for Shepherd operations
pub type Result<T> = std::result::Result<T, ShepherdError>;

impl ShepherdError {
    /// Whether this error aborts the whole operation.
    ///
    /// Per-source and per-candidate failures are absorbed into domain status;
    /// only environment-level errors surface as process failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ShepherdError::SourceUnavailable { .. }
                | ShepherdError::ProxyConnectionFailed(_)
                | ShepherdError::Timeout
        )
    }
}

// Convert from reqwest errors (provider API fetches)
impl From<reqwest::Error> for ShepherdError {
    fn from(err: reqwest::Error) -> Self {
        ShepherdError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for ShepherdError {
    fn from(err: url::ParseError) -> Self {
        ShepherdError::InvalidConfig(format!("invalid URL: {}", err))
    }
}
