//! Delegated HTTP Basic credential validation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::cache::CredentialCache;
use crate::error::{Result, ServerError};

/// Checks a username/password pair.
#[async_trait]
pub trait CredentialValidator: Send + Sync + std::fmt::Debug {
    async fn validate(&self, user: &str, password: &str) -> bool;
}

/// Thread-safe shared validator.
pub type SharedValidator = Arc<dyn CredentialValidator>;

/// Validates credentials by probing an endpoint with HTTP Basic auth.
///
/// A `200 OK` means valid. Any other status, or a transport failure, means
/// invalid. Only successes are cached.
#[derive(Debug)]
pub struct DelegatedValidator {
    client: Client,
    url: Url,
    cache: CredentialCache,
}

impl DelegatedValidator {
    /// Create a validator whose probes are bounded by `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url,
            cache: CredentialCache::new(),
        })
    }

    pub fn with_cache(mut self, cache: CredentialCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    async fn probe(&self, user: &str, password: &str) -> bool {
        let response = self
            .client
            .get(self.url.clone())
            .basic_auth(user, Some(password))
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                debug!(user = %user, status = %response.status(), "Delegated auth rejected credentials");
                false
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Delegated auth request failed");
                false
            }
        }
    }
}

#[async_trait]
impl CredentialValidator for DelegatedValidator {
    async fn validate(&self, user: &str, password: &str) -> bool {
        if self.cache.contains(user, password) {
            return true;
        }
        if self.probe(user, password).await {
            self.cache.insert(user, password);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // "testuser:asdf"
    const TESTUSER_ASDF: &str = "Basic dGVzdHVzZXI6YXNkZg==";
    // "notfound:asdf"
    const NOTFOUND_ASDF: &str = "Basic bm90Zm91bmQ6YXNkZg==";

    fn validator(server: &MockServer) -> DelegatedValidator {
        let url = Url::parse(&format!("{}/check", server.uri())).unwrap();
        DelegatedValidator::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_then_invalid_then_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .and(header("authorization", TESTUSER_ASDF))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .and(header("authorization", NOTFOUND_ASDF))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let validator = validator(&server);
        assert!(validator.validate("testuser", "asdf").await);
        assert!(!validator.validate("notfound", "asdf").await);
        assert!(validator.validate("testuser", "asdf").await);

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&server)
            .await;

        let validator = validator(&server);
        for _ in 0..3 {
            assert!(!validator.validate("jane", "nope").await);
        }
        assert!(validator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_only_200_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(!validator(&server).validate("jane", "pw").await);
    }

    #[tokio::test]
    async fn test_overflow_forces_reprobe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(4)
            .mount(&server)
            .await;

        let validator = validator(&server)
            .with_cache(CredentialCache::with_limits(Duration::from_secs(60), 2));

        assert!(validator.validate("a", "pw").await);
        assert!(validator.validate("b", "pw").await);
        assert!(validator.validate("c", "pw").await);
        // Three entries is past the ceiling of two: the lookup resets and re-probes.
        assert!(validator.validate("a", "pw").await);
        assert_eq!(validator.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_invalid() {
        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9/check").unwrap();
        let validator = DelegatedValidator::new(url, Duration::from_secs(2)).unwrap();
        assert!(!validator.validate("jane", "pw").await);
        assert!(validator.cache().is_empty());
    }
}
