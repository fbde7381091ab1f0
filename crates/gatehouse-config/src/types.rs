//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! http_address = "127.0.0.1:4180"
//! upstreams = ["http://127.0.0.1:8080/"]
//! email_domains = ["example.com"]
//!
//! [cookie]
//! secret = "..."
//!
//! [provider]
//! client_id = "..."
//! client_secret = "..."
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default listen address.
pub const DEFAULT_HTTP_ADDRESS: &str = "127.0.0.1:4180";

/// Default cookie lifetime in seconds (168 hours).
pub const DEFAULT_COOKIE_EXPIRE_SECS: u64 = 168 * 60 * 60;

/// Default timeout for calls to the provider and the delegated validator.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// `host:port` to listen on.
    pub http_address: String,

    /// OAuth callback URL. When absent or host-less, derived from the request.
    pub redirect_url: Option<String>,

    /// Upstream URLs. The URL path is the mount point.
    pub upstreams: Vec<String>,

    /// Path patterns that bypass authentication.
    pub skip_auth_regex: Vec<String>,

    /// Send `X-Forwarded-User`/`X-Forwarded-Email` and basic auth upstream.
    pub pass_basic_auth: bool,

    /// Send `X-Forwarded-Access-Token` upstream.
    pub pass_access_token: bool,

    /// Keep the inbound `Host` header instead of the upstream's.
    pub pass_host_header: bool,

    /// Email domains allowed in. `*` allows everyone.
    pub email_domains: Vec<String>,

    /// Individual addresses allowed regardless of domain.
    pub authenticated_emails: Vec<String>,

    /// Endpoint that validates HTTP Basic credentials.
    pub delegated_auth_url: Option<String>,

    /// Show the username/password form on the sign-in page.
    pub display_htpasswd_form: bool,

    /// Directory with `sign_in.html` and/or `error.html` overrides.
    pub custom_templates_dir: Option<PathBuf>,

    /// Extra text on the sign-in page.
    pub sign_in_message: Option<String>,

    /// Log every request.
    pub request_logging: bool,

    /// Timeout, in seconds, for provider and delegated validator calls.
    pub timeout_secs: u64,

    pub cookie: CookieSection,

    pub provider: ProviderSection,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            http_address: DEFAULT_HTTP_ADDRESS.to_string(),
            redirect_url: None,
            upstreams: Vec::new(),
            skip_auth_regex: Vec::new(),
            pass_basic_auth: true,
            pass_access_token: false,
            pass_host_header: true,
            email_domains: Vec::new(),
            authenticated_emails: Vec::new(),
            delegated_auth_url: None,
            display_htpasswd_form: true,
            custom_templates_dir: None,
            sign_in_message: None,
            request_logging: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cookie: CookieSection::default(),
            provider: ProviderSection::default(),
        }
    }
}

impl GatehouseConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

/// `[cookie]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSection {
    pub name: String,
    pub secret: String,
    pub domain: Option<String>,
    pub expire_secs: u64,
    /// Zero disables refresh.
    pub refresh_secs: u64,
    pub secure: bool,
    pub http_only: bool,
}

impl Default for CookieSection {
    fn default() -> Self {
        Self {
            name: "_oauthproxy".to_string(),
            secret: String::new(),
            domain: None,
            expire_secs: DEFAULT_COOKIE_EXPIRE_SECS,
            refresh_secs: 0,
            secure: true,
            http_only: true,
        }
    }
}

/// `[provider]` section. Unset endpoints fall back to Google's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Display name on the sign-in page.
    pub name: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub login_url: Option<String>,
    pub redeem_url: Option<String>,
    pub validate_url: Option<String>,
    pub profile_url: Option<String>,
    pub scope: Option<String>,
}
