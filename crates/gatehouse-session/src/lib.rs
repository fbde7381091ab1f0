//! Stateless session cookies.
//!
//! All session state round-trips through the client. This crate provides:
//! - [`Session`]: the identity/token tuple carried in the cookie
//! - [`CookieConfig`]: cookie attributes plus expiry and refresh policy
//! - [`SessionCodec`]: HMAC signing with optional AES-GCM payload encryption
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse_session::{CookieConfig, Session, SessionCodec};
//!
//! let config = CookieConfig::new("a-cookie-secret-of-some-length").with_encryption(true);
//! let codec = SessionCodec::new(&config)?;
//!
//! let value = codec.encode(&Session::from_email("jane@example.com", "token"), Utc::now())?;
//! let decoded = codec.decode(&value, Utc::now())?;
//! assert_eq!(decoded.session.user, "jane");
//! ```

mod codec;
mod config;
mod error;
mod session;

pub use codec::{Decoded, SessionCodec};
pub use config::{CookieConfig, DEFAULT_COOKIE_EXPIRE, DEFAULT_COOKIE_NAME, MIN_CIPHER_SECRET_LEN};
pub use error::{Result, SessionError};
pub use session::Session;
