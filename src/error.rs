//! # Orchestrator Error Types
//!
//! Error taxonomy for batch orchestration. Only [`OrchestratorError::FatalConfig`]
//! (and invalid input rejected before any batch starts) stops an orchestration
//! outright; every other variant is recovered inside the batch that raised it.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Caller-supplied data was rejected (zero batch size, unparseable work list)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The executor refused or never received a batch dispatch
    #[error("Dispatch failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Dispatch { status: Option<u16>, message: String },

    /// Listing executor runs failed; callers treat this as "not found yet"
    #[error("Run listing failed: {0}")]
    LocatorTransient(String),

    /// Reading host status or comments failed; callers treat this as "not cancelled"
    #[error("Cancellation check failed: {0}")]
    CancellationCheck(String),

    /// Non-success response from a remote API
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unresolvable configuration, credentials or instance before orchestration starts
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn fatal_config(message: impl Into<String>) -> Self {
        Self::FatalConfig(message.into())
    }

    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Convert any remote failure into a dispatch error, keeping the HTTP status when known
    pub fn into_dispatch(self) -> Self {
        match self {
            Self::Dispatch { .. } => self,
            Self::Api { status, message } => Self::Dispatch {
                status: Some(status),
                message,
            },
            Self::Http(e) => Self::Dispatch {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            other => Self::Dispatch {
                status: None,
                message: other.to_string(),
            },
        }
    }

    /// Whether the error only affects the batch that raised it
    #[must_use]
    pub fn is_batch_local(&self) -> bool {
        !matches!(self, Self::FatalConfig(_) | Self::InvalidInput(_))
    }
}
