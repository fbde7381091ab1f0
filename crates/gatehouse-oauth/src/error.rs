//! Error types for the OAuth provider client.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned an error or an unusable response.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Callback carried no authorization code.
    #[error("missing code")]
    MissingCode,

    /// No email could be determined for the identity.
    #[error("Email unavailable: {0}")]
    MissingEmail(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Network(e.to_string())
    }
}
