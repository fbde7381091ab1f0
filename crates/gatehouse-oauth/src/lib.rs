//! OAuth provider client and authorization policy.
//!
//! # Components
//!
//! - [`provider`]: the `Provider` capability trait and its static data
//! - [`http`]: HTTP-backed provider (Google endpoints by default)
//! - [`login`]: authorization URL construction and return-path checks
//! - [`policy`]: the email authorization predicate

pub mod error;
pub mod http;
pub mod login;
pub mod policy;
pub mod provider;

pub use error::{OAuthError, Result};
pub use http::OAuthProvider;
pub use login::{authorization_url, is_relative_redirect};
pub use policy::{AuthorizationPolicy, EmailDomains, SharedPolicy};
pub use provider::{Provider, ProviderData, Redemption, SharedProvider};
