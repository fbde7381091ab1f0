//! Validation of a loaded config into runtime settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gatehouse_session::MIN_CIPHER_SECRET_LEN;
use regex::Regex;
use url::Url;

use crate::{ConfigError, CookieSection, GatehouseConfig, Result};

/// Path the provider redirects back to.
pub const CALLBACK_PATH: &str = "/oauth2/callback";

/// Immutable settings the proxy runs with.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub http_address: SocketAddr,
    /// Absolute callback URL, or `None` to derive it from each request's host.
    pub redirect_url: Option<Url>,
    pub upstreams: Vec<Url>,
    pub skip_auth_regex: Vec<Regex>,
    pub pass_basic_auth: bool,
    pub pass_access_token: bool,
    pub pass_host_header: bool,
    pub email_domains: Vec<String>,
    pub authenticated_emails: Vec<String>,
    pub delegated_auth_url: Option<Url>,
    pub display_htpasswd_form: bool,
    pub custom_templates_dir: Option<PathBuf>,
    pub sign_in_message: Option<String>,
    pub request_logging: bool,
    pub timeout: Duration,
    pub cookie: CookieSection,
    /// Whether cookie payloads must be encrypted.
    pub encrypt_cookie: bool,
    pub provider: ValidatedProvider,
}

/// Provider settings with URLs parsed. Unset endpoints stay `None`.
#[derive(Debug, Clone)]
pub struct ValidatedProvider {
    pub name: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub login_url: Option<Url>,
    pub redeem_url: Option<Url>,
    pub validate_url: Option<Url>,
    pub profile_url: Option<Url>,
    pub scope: Option<String>,
}

impl GatehouseConfig {
    /// Check every setting and produce the runtime form.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        require("provider.client_id", &self.provider.client_id)?;
        require("provider.client_secret", &self.provider.client_secret)?;
        require("cookie.secret", &self.cookie.secret)?;

        if self.upstreams.is_empty() {
            return Err(ConfigError::MissingField {
                field: "upstreams".to_string(),
            });
        }

        let encrypt_cookie = self.pass_access_token || self.cookie.refresh_secs != 0;
        if encrypt_cookie && self.cookie.secret.len() < MIN_CIPHER_SECRET_LEN {
            return Err(ConfigError::InvalidCookieSecret(format!(
                "pass_access_token and cookie.refresh_secs need a secret of at least {} bytes",
                MIN_CIPHER_SECRET_LEN
            )));
        }

        let http_address = self
            .http_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.http_address.clone()))?;

        let upstreams = self
            .upstreams
            .iter()
            .map(|u| parse_upstream(u))
            .collect::<Result<Vec<_>>>()?;

        let skip_auth_regex = self
            .skip_auth_regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let redirect_url = match &self.redirect_url {
            Some(raw) => parse_redirect_url(raw)?,
            None => None,
        };

        Ok(ValidatedConfig {
            http_address,
            redirect_url,
            upstreams,
            skip_auth_regex,
            pass_basic_auth: self.pass_basic_auth,
            pass_access_token: self.pass_access_token,
            pass_host_header: self.pass_host_header,
            email_domains: self.email_domains.clone(),
            authenticated_emails: self.authenticated_emails.clone(),
            delegated_auth_url: parse_optional("delegated_auth_url", &self.delegated_auth_url)?,
            display_htpasswd_form: self.display_htpasswd_form,
            custom_templates_dir: self.custom_templates_dir.clone(),
            sign_in_message: self.sign_in_message.clone(),
            request_logging: self.request_logging,
            timeout: Duration::from_secs(self.timeout_secs),
            cookie: self.cookie.clone(),
            encrypt_cookie,
            provider: ValidatedProvider {
                name: self.provider.name.clone(),
                client_id: self.provider.client_id.clone(),
                client_secret: self.provider.client_secret.clone(),
                login_url: parse_optional("provider.login_url", &self.provider.login_url)?,
                redeem_url: parse_optional("provider.redeem_url", &self.provider.redeem_url)?,
                validate_url: parse_optional("provider.validate_url", &self.provider.validate_url)?,
                profile_url: parse_optional("provider.profile_url", &self.provider.profile_url)?,
                scope: self.provider.scope.clone(),
            },
        })
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn parse_upstream(raw: &str) -> Result<Url> {
    let invalid = |reason: String| ConfigError::InvalidUpstream {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// A host-less value (e.g. `/oauth2/callback`) means "derive from the request".
fn parse_redirect_url(raw: &str) -> Result<Option<Url>> {
    match Url::parse(raw) {
        Ok(mut url) if url.host_str().is_some() => {
            url.set_path(CALLBACK_PATH);
            url.set_query(None);
            Ok(Some(url))
        }
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Ok(None),
        Err(e) => Err(ConfigError::InvalidRedirectUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_optional(field: &str, raw: &Option<String>) -> Result<Option<Url>> {
    raw.as_deref()
        .map(|s| {
            Url::parse(s).map_err(|e| ConfigError::InvalidUrl {
                field: field.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
