//! Provider capability trait.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// Static provider settings.
#[derive(Debug, Clone)]
pub struct ProviderData {
    /// Human-readable name shown on the sign-in page.
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint the browser is redirected to.
    pub login_url: Url,
    /// Token endpoint used to redeem authorization codes.
    pub redeem_url: Url,
    /// Endpoint used to check that an access token is still good.
    pub validate_url: Url,
    /// Optional userinfo endpoint, used when the token response has no `id_token`.
    pub profile_url: Option<Url>,
    pub scope: String,
}

/// Result of redeeming an authorization code.
#[derive(Debug, Clone, Default)]
pub struct Redemption {
    pub access_token: String,
    /// Raw token response, kept for email extraction.
    pub body: serde_json::Value,
}

/// An OAuth identity provider.
///
/// Implementations must not bound their own calls indefinitely; the HTTP
/// implementation applies the timeout it was built with.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Static provider settings.
    fn data(&self) -> &ProviderData;

    /// Exchange an authorization code for an access token.
    async fn redeem(&self, redirect_uri: &str, code: &str) -> Result<Redemption>;

    /// Determine the email address of the identity behind a redemption.
    async fn email_address(&self, redemption: &Redemption) -> Result<String>;

    /// Whether the access token is still accepted by the provider.
    async fn validate_token(&self, access_token: &str) -> bool;
}

/// Thread-safe shared provider.
pub type SharedProvider = Arc<dyn Provider>;
