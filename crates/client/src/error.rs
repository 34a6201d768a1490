//! Client error type

/// Engine error type reported for unknown resources
pub const NOT_FOUND: &str = "NotFound";

/// Error type for engine REST operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Structured error returned by the engine (`{"type": ..., "message": ...}`)
    #[error("{message}")]
    Engine { error_type: String, message: String },

    /// Non-2xx response without a structured error body
    #[error("response error with status code {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure (connect, timeout, TLS, ...)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request or response body could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Endpoint URL could not be built
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Build an engine error with the given type and message
    pub fn engine(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// The error the engine reports for a missing resource
    pub fn not_found() -> Self {
        Self::engine(NOT_FOUND, "Not found")
    }

    /// Structured engine error type, if any
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Self::Engine { error_type, .. } => Some(error_type),
            _ => None,
        }
    }

    /// Check if the engine reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        self.error_type() == Some(NOT_FOUND)
    }
}
