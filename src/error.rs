//! Error types for route-sync

use thiserror::Error;

/// Main error type for route-sync operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus connect or publish error
    #[error("message bus error: {0}")]
    MessageBus(String),

    /// Routing API error (transport, non-2xx response, or router group mismatch)
    #[error("routing api error: {0}")]
    RoutingApi(String),

    /// Token fetch or missing-credential error
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a message bus error with the given message
    pub fn message_bus(msg: impl Into<String>) -> Self {
        Self::MessageBus(msg.into())
    }

    /// Create a routing API error with the given message
    pub fn routing_api(msg: impl Into<String>) -> Self {
        Self::RoutingApi(msg.into())
    }

    /// Create an authentication error with the given message
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
