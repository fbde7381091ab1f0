//! Error types for session cookie operations.

/// Error type for session cookie operations.
///
/// Callers at the request boundary treat every variant the same way
/// ("no session"); the variants exist for logging and tests.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Cookie value is not `payload|timestamp|signature`.
    #[error("Malformed cookie value: {0}")]
    InvalidFormat(String),

    /// Signature did not verify.
    #[error("Cookie signature mismatch")]
    BadSignature,

    /// Timestamp is outside the accepted window.
    #[error("Cookie timestamp outside accepted window")]
    Expired,

    /// Payload could not be encrypted.
    #[error("Encryption failed")]
    Encrypt,

    /// Payload could not be decrypted.
    #[error("Decryption failed")]
    Decrypt,

    /// Decoded payload is not a usable session.
    #[error("Invalid session payload: {0}")]
    Payload(String),

    /// Cookie secret cannot be used as a cipher key.
    #[error("Invalid cookie secret: {0}")]
    InvalidKey(String),

    /// Refresh is enabled on a cookie that is not encrypted.
    #[error("Cookie refresh requires payload encryption")]
    RefreshWithoutEncryption,
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Payload(e.to_string())
    }
}

/// Result type for session cookie operations.
pub type Result<T> = std::result::Result<T, SessionError>;
