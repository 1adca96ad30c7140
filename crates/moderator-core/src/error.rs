//! Error types for Moderator

/// Result type alias using Moderator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Moderator operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request content failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Tokenization or forward-pass errors
    #[error("model error: {0}")]
    Model(String),

    /// Checkpoint download, caching, or parsing errors
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote moderation service could not be reached
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Model(_) => "model",
            Self::Checkpoint(_) => "checkpoint",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Http(_) => "http",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}
