//! Unified error types for the proxy.
//!
//! Each variant renders with a stable upper-case code prefix so log lines and
//! JSON error bodies can be matched without parsing free text.

/// Unified error types for the meilisearch proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cache backend failure (get, set, invalidate or clear).
    #[error("CACHE_ERROR: {0}")]
    Cache(String),

    /// The upstream search engine could not be reached at all.
    #[error("UPSTREAM_UNREACHABLE: {0}")]
    UpstreamUnreachable(String),

    /// The upstream answered, but the exchange could not be completed.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// The inbound request body could not be read.
    #[error("BODY_READ_ERROR: {0}")]
    BodyRead(String),

    /// A gzip or deflate upstream body failed to decode.
    #[error("DECOMPRESSION_ERROR: {0}")]
    Decompression(String),

    /// Credential mismatch (override mode or purge token).
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Stable machine-readable code, identical to the display prefix.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Cache(_) => "CACHE_ERROR",
            Error::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
            Error::Upstream(_) => "UPSTREAM_ERROR",
            Error::BodyRead(_) => "BODY_READ_ERROR",
            Error::Decompression(_) => "DECOMPRESSION_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Human-readable message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Cache(msg)
            | Error::UpstreamUnreachable(msg)
            | Error::Upstream(msg)
            | Error::BodyRead(msg)
            | Error::Decompression(msg)
            | Error::Unauthorized(msg)
            | Error::InvalidInput(msg) => msg,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Cache(err.to_string())
    }
}
