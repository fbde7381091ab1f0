//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field.
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// Upstream URL could not be used.
    #[error("invalid upstream '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },

    /// Callback URL could not be parsed.
    #[error("invalid redirect_url '{url}': {reason}")]
    InvalidRedirectUrl { url: String, reason: String },

    /// Some other URL setting could not be parsed.
    #[error("invalid URL for '{field}': {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Skip-auth pattern failed to compile.
    #[error("invalid skip_auth_regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// Cookie secret unusable for the requested features.
    #[error("invalid cookie secret: {0}")]
    InvalidCookieSecret(String),

    /// Listen address could not be parsed.
    #[error("invalid http_address '{0}'")]
    InvalidAddress(String),
}
