//! Cookie attributes and the expiry/refresh policy.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "_oauthproxy";

/// Default cookie lifetime (168 hours).
pub const DEFAULT_COOKIE_EXPIRE: Duration = Duration::from_secs(168 * 60 * 60);

/// Minimum secret length accepted when payload encryption is enabled.
pub const MIN_CIPHER_SECRET_LEN: usize = 16;

/// Cookie settings. Immutable once the proxy is running.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Cookie name. Also bound into the signature.
    pub name: String,

    /// Signing seed, and the key material for payload encryption.
    pub secret: String,

    /// Cookie `Domain`. `None` uses the request host, without its port.
    pub domain: Option<String>,

    /// `Secure` attribute.
    pub secure: bool,

    /// `HttpOnly` attribute.
    pub http_only: bool,

    /// Lifetime of an issued cookie.
    pub expire: Duration,

    /// Refresh window. Zero disables re-validation.
    pub refresh: Duration,

    /// Encrypt the payload so the access token stays opaque to the client.
    pub encrypt: bool,
}

impl CookieConfig {
    /// Create a configuration with the given secret and default attributes.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            secret: secret.into(),
            domain: None,
            secure: true,
            http_only: true,
            expire: DEFAULT_COOKIE_EXPIRE,
            refresh: Duration::ZERO,
            encrypt: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Set the refresh window. A non-zero window requires encryption;
    /// [`SessionCodec::new`](crate::SessionCodec::new) rejects it otherwise.
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Whether refresh-time re-validation is enabled.
    pub fn refresh_enabled(&self) -> bool {
        !self.refresh.is_zero()
    }

    /// Hard expiry of a cookie issued at `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        add_saturating(issued_at, self.expire)
    }

    /// Whether a cookie issued at `issued_at` is stale-but-present at `now`.
    ///
    /// Stale when `now + refresh > issued_at + expire`. Always false when
    /// refresh is disabled.
    pub fn needs_refresh(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if !self.refresh_enabled() {
            return false;
        }
        add_saturating(now, self.refresh) > self.expires_at(issued_at)
    }
}

pub(crate) fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

pub(crate) fn add_saturating(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(to_delta(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    const E: u64 = 3600;
    const R: u64 = 600;

    fn config() -> CookieConfig {
        CookieConfig::new("secret")
            .with_expire(Duration::from_secs(E))
            .with_refresh(Duration::from_secs(R))
    }

    #[test]
    fn test_defaults() {
        let config = CookieConfig::new("secret");
        assert_eq!(config.name, "_oauthproxy");
        assert!(config.secure);
        assert!(config.http_only);
        assert_eq!(config.expire, DEFAULT_COOKIE_EXPIRE);
        assert!(!config.refresh_enabled());
        assert!(!config.encrypt);
    }

    #[test]
    fn test_stale_just_inside_refresh_window() {
        let config = config();
        let now = Utc::now();
        let issued_at = now - TimeDelta::seconds(E as i64) + TimeDelta::seconds(R as i64 - 1);
        assert!(config.needs_refresh(issued_at, now));
    }

    #[test]
    fn test_fresh_just_outside_refresh_window() {
        let config = config();
        let now = Utc::now();
        let issued_at = now - TimeDelta::seconds(E as i64) + TimeDelta::seconds(R as i64 + 1);
        assert!(!config.needs_refresh(issued_at, now));
    }

    #[test]
    fn test_refresh_disabled_never_stale() {
        let config = config().with_refresh(Duration::ZERO);
        let now = Utc::now();
        let issued_at = now - TimeDelta::seconds(E as i64 - 1);
        assert!(!config.needs_refresh(issued_at, now));
    }

    #[test]
    fn test_huge_expire_saturates() {
        let config = CookieConfig::new("secret").with_expire(Duration::MAX);
        assert_eq!(config.expires_at(Utc::now()), DateTime::<Utc>::MAX_UTC);
    }
}
