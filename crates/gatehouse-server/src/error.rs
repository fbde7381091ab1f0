//! Error types for the server.

use std::net::SocketAddr;

use thiserror::Error;

/// Server error type.
///
/// Only raised while building or starting the proxy. Request-time failures
/// are rendered as pages and never surface as a `ServerError`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be turned into a running proxy.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sign-in or error template failed to compile.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The listener could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<gatehouse_config::ConfigError> for ServerError {
    fn from(e: gatehouse_config::ConfigError) -> Self {
        ServerError::Config(e.to_string())
    }
}

impl From<gatehouse_oauth::OAuthError> for ServerError {
    fn from(e: gatehouse_oauth::OAuthError) -> Self {
        ServerError::Config(format!("OAuth provider: {}", e))
    }
}

impl From<gatehouse_session::SessionError> for ServerError {
    fn from(e: gatehouse_session::SessionError) -> Self {
        ServerError::Config(format!("Session cookie: {}", e))
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
