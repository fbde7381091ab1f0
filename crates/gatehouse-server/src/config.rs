//! Proxy options.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gatehouse_config::ValidatedConfig;
use gatehouse_session::CookieConfig;
use regex::Regex;
use url::Url;

use crate::upstream::DEFAULT_MAX_BODY_SIZE;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:4180";

/// Runtime options for the proxy.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Fixed OAuth callback URL. `None` derives it from the request host.
    pub redirect_url: Option<Url>,

    /// Paths matching any of these bypass authentication.
    pub skip_auth_regex: Vec<Regex>,

    pub pass_basic_auth: bool,
    pub pass_access_token: bool,
    pub pass_host_header: bool,

    /// Offer the username/password form when a delegate is configured.
    pub display_htpasswd_form: bool,

    pub sign_in_message: Option<String>,

    /// Directory with template overrides.
    pub custom_templates_dir: Option<PathBuf>,

    /// Enable request logging.
    pub request_logging: bool,

    /// Maximum request body size buffered for forms and forwarding.
    pub max_body_size: usize,

    pub cookie: CookieConfig,
}

impl ServerOptions {
    /// Options with defaults around the given cookie settings.
    pub fn new(cookie: CookieConfig) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 4180)),
            redirect_url: None,
            skip_auth_regex: Vec::new(),
            pass_basic_auth: true,
            pass_access_token: false,
            pass_host_header: true,
            display_htpasswd_form: true,
            sign_in_message: None,
            custom_templates_dir: None,
            request_logging: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            cookie,
        }
    }

    /// Options from a validated configuration file.
    pub fn from_config(config: &ValidatedConfig) -> Self {
        let section = &config.cookie;
        let mut cookie = CookieConfig::new(section.secret.clone())
            .with_name(section.name.clone())
            .with_secure(section.secure)
            .with_http_only(section.http_only)
            .with_expire(Duration::from_secs(section.expire_secs))
            .with_refresh(Duration::from_secs(section.refresh_secs))
            .with_encryption(config.encrypt_cookie);
        if let Some(domain) = &section.domain {
            cookie = cookie.with_domain(domain.clone());
        }

        Self {
            bind_address: config.http_address,
            redirect_url: config.redirect_url.clone(),
            skip_auth_regex: config.skip_auth_regex.clone(),
            pass_basic_auth: config.pass_basic_auth,
            pass_access_token: config.pass_access_token,
            pass_host_header: config.pass_host_header,
            display_htpasswd_form: config.display_htpasswd_form,
            sign_in_message: config.sign_in_message.clone(),
            custom_templates_dir: config.custom_templates_dir.clone(),
            request_logging: config.request_logging,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            cookie,
        }
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_redirect_url(mut self, url: Url) -> Self {
        self.redirect_url = Some(url);
        self
    }

    pub fn with_skip_auth_regex(mut self, patterns: Vec<Regex>) -> Self {
        self.skip_auth_regex = patterns;
        self
    }

    pub fn with_pass_basic_auth(mut self, enabled: bool) -> Self {
        self.pass_basic_auth = enabled;
        self
    }

    pub fn with_pass_access_token(mut self, enabled: bool) -> Self {
        self.pass_access_token = enabled;
        self
    }

    pub fn with_pass_host_header(mut self, enabled: bool) -> Self {
        self.pass_host_header = enabled;
        self
    }

    pub fn with_display_htpasswd_form(mut self, enabled: bool) -> Self {
        self.display_htpasswd_form = enabled;
        self
    }

    pub fn with_sign_in_message(mut self, message: impl Into<String>) -> Self {
        self.sign_in_message = Some(message.into());
        self
    }

    pub fn with_custom_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.custom_templates_dir = Some(dir.into());
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}
