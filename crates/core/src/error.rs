use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// How a streaming capture failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingFailure {
    /// Buffered content would exceed the configured character bound.
    SizeExceeded { limit: usize, observed: usize },
    /// A chunk arrived that could not be interpreted.
    MalformedChunk(String),
    /// The upstream sequence terminated with an error.
    UpstreamAborted(String),
}

impl std::fmt::Display for StreamingFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeExceeded { limit, observed } => {
                write!(f, "buffer size exceeded ({observed} > {limit} chars)")
            }
            Self::MalformedChunk(detail) => write!(f, "malformed chunk: {detail}"),
            Self::UpstreamAborted(detail) => write!(f, "upstream aborted: {detail}"),
        }
    }
}

/// Normalized surface of the external LLM provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: Box<Error>,
    },

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("streaming error: {0}")]
    Streaming(StreamingFailure),

    #[error("recording error: {0}")]
    Recording(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a lower error in strategy context, preserving it as the cause.
    pub fn strategy(name: impl Into<String>, source: Error) -> Self {
        Self::Strategy {
            strategy: name.into(),
            source: Box::new(source),
        }
    }

    /// Whether a retry has any chance of succeeding.  Strategy wrappers
    /// defer to the wrapped cause.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Timeout(_) | Self::Io(_) => true,
            Self::Provider(ProviderError::Network(_) | ProviderError::RateLimit(_)) => true,
            Self::Strategy { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Stable short label for failure statistics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Storage(_) => "storage",
            Self::Strategy { .. } => "strategy",
            Self::Timeout(_) => "timeout",
            Self::Streaming(_) => "streaming",
            Self::Recording(_) => "recording",
            Self::Provider(_) => "provider",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_timeout_are_transient() {
        assert!(Error::Storage("connection reset".into()).is_transient());
        assert!(Error::Timeout(5000).is_transient());
    }

    #[test]
    fn validation_and_configuration_are_not_transient() {
        assert!(!Error::Validation("bad limit".into()).is_transient());
        assert!(!Error::Configuration("depth exceeds ceiling".into()).is_transient());
    }

    #[test]
    fn strategy_wrapper_defers_to_cause() {
        let transient = Error::strategy("fts", Error::Storage("locked".into()));
        assert!(transient.is_transient());
        assert_eq!(transient.category(), "strategy");

        let terminal = Error::strategy("fts", Error::Validation("bad query".into()));
        assert!(!terminal.is_transient());
    }

    #[test]
    fn streaming_failures_are_not_transient() {
        let err = Error::Streaming(StreamingFailure::SizeExceeded {
            limit: 10,
            observed: 11,
        });
        assert!(!err.is_transient());
        assert_eq!(err.category(), "streaming");
    }
}
