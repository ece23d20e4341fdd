//! Error types for Leadflow.
//!
//! Library crates use [`LeadflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Leadflow operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadflowError {
    /// A lead (or other entity) id did not resolve.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The lead lacks data a stage requires (e.g. no reachable channel).
    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    /// The stage was invoked on a lead whose status does not allow it.
    #[error("invalid state: cannot {action} lead {lead_id} in status {status}")]
    InvalidState {
        lead_id: String,
        status: String,
        action: &'static str,
    },

    /// An external capability errored or timed out.
    #[error("adapter {adapter} failed: {message}")]
    Adapter { adapter: String, message: String },

    /// The drafting capability failed hard.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Another stage is already running for this lead.
    #[error("lead {0} is busy with another pipeline stage")]
    Busy(String),

    /// The outbound send window for a channel is exhausted.
    #[error("rate limited on {channel}: retry in {retry_after_secs}s")]
    RateLimited {
        channel: String,
        retry_after_secs: u64,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, malformed payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadflowError>;

impl LeadflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a precondition error from any displayable message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: msg.into(),
        }
    }

    /// A lead id that did not resolve.
    pub fn lead_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "lead",
            id: id.to_string(),
        }
    }

    /// Create an adapter error attributed to a named capability.
    pub fn adapter(adapter: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status the request layer reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::PreconditionFailed { .. } | Self::Validation { .. } => 422,
            Self::InvalidState { .. } => 409,
            Self::Adapter { .. } | Self::GenerationFailed(_) | Self::Network(_) => 502,
            Self::Busy(_) => 423,
            Self::RateLimited { .. } => 429,
            Self::Config { .. } | Self::Storage(_) | Self::Io { .. } => 500,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::RateLimited { .. } | Self::Adapter { .. } | Self::Network(_)
        )
    }

    /// Short machine-readable code, used in structured error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::PreconditionFailed { .. } => "precondition_failed",
            Self::InvalidState { .. } => "invalid_state",
            Self::Adapter { .. } => "adapter_failure",
            Self::GenerationFailed(_) => "generation_failed",
            Self::Busy(_) => "busy",
            Self::RateLimited { .. } => "rate_limited",
            Self::Config { .. } => "config",
            Self::Network(_) => "network",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}
