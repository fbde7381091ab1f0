//! HTTP-backed OAuth 2.0 provider.
//!
//! Speaks the authorization-code flow against configurable endpoints. The
//! defaults point at Google.

use std::time::Duration;

use async_trait::async_trait;
use base64::{
    Engine,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use url::Url;

use crate::error::{OAuthError, Result};
use crate::provider::{Provider, ProviderData, Redemption};

pub const GOOGLE_LOGIN_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_REDEEM_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const GOOGLE_VALIDATE_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
pub const GOOGLE_SCOPE: &str = "profile email";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EmailClaims {
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: Option<bool>,
}

/// Provider that talks to real OAuth endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    client: Client,
    data: ProviderData,
}

impl OAuthProvider {
    /// Create a provider whose calls are bounded by `timeout`.
    pub fn new(data: ProviderData, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, data })
    }

    /// Provider data for Google with the given client credentials.
    pub fn google_data(client_id: &str, client_secret: &str) -> Result<ProviderData> {
        let parse = |s: &str| {
            Url::parse(s).map_err(|e| OAuthError::Config(format!("Invalid URL {}: {}", s, e)))
        };
        Ok(ProviderData {
            provider_name: "Google".to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            login_url: parse(GOOGLE_LOGIN_URL)?,
            redeem_url: parse(GOOGLE_REDEEM_URL)?,
            validate_url: parse(GOOGLE_VALIDATE_URL)?,
            profile_url: None,
            scope: GOOGLE_SCOPE.to_string(),
        })
    }

    async fn profile_email(&self, url: &Url, access_token: &str) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Backend(format!(
                "Profile request failed: {}",
                response.status()
            )));
        }

        let claims: EmailClaims = response
            .json()
            .await
            .map_err(|e| OAuthError::Backend(format!("Failed to parse profile: {}", e)))?;
        checked_email(claims)
    }
}

#[async_trait]
impl Provider for OAuthProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    async fn redeem(&self, redirect_uri: &str, code: &str) -> Result<Redemption> {
        if code.is_empty() {
            return Err(OAuthError::MissingCode);
        }

        let params = [
            ("redirect_uri", redirect_uri),
            ("client_id", self.data.client_id.as_str()),
            ("client_secret", self.data.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(self.data.redeem_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Network(format!("Code redemption request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OAuthError::Network(format!("Failed to read token response: {}", e)))?;
        if !status.is_success() {
            return Err(OAuthError::Backend(format!(
                "Code redemption failed ({}): {}",
                status, text
            )));
        }

        let body: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| OAuthError::Backend(format!("Failed to parse token response: {}", e)))?;
        let token: TokenResponse = serde_json::from_value(body.clone())
            .map_err(|e| OAuthError::Backend(format!("Token response has no access_token: {}", e)))?;

        Ok(Redemption {
            access_token: token.access_token,
            body,
        })
    }

    async fn email_address(&self, redemption: &Redemption) -> Result<String> {
        if let Some(id_token) = redemption.body.get("id_token").and_then(|v| v.as_str()) {
            return email_from_id_token(id_token);
        }
        match &self.data.profile_url {
            Some(url) => self.profile_email(url, &redemption.access_token).await,
            None => Err(OAuthError::MissingEmail(
                "token response has no id_token and no profile URL is configured".to_string(),
            )),
        }
    }

    async fn validate_token(&self, access_token: &str) -> bool {
        if access_token.is_empty() {
            return false;
        }

        let mut url = self.data.validate_url.clone();
        url.query_pairs_mut().append_pair("access_token", access_token);

        match self.client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::info!(status = %response.status(), "Access token rejected by provider");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token validation request failed");
                false
            }
        }
    }
}

/// Extract the email claim from an unverified JWT.
///
/// The token arrived directly from the provider's token endpoint over TLS, so
/// its signature is not checked here.
fn email_from_id_token(id_token: &str) -> Result<String> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| OAuthError::MissingEmail("id_token is not a JWT".to_string()))?;

    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(payload))
        .map_err(|e| OAuthError::MissingEmail(format!("id_token payload: {}", e)))?;

    let claims: EmailClaims = serde_json::from_slice(&raw)
        .map_err(|e| OAuthError::MissingEmail(format!("id_token claims: {}", e)))?;
    checked_email(claims)
}

fn checked_email(claims: EmailClaims) -> Result<String> {
    if claims.email_verified == Some(false) {
        return Err(OAuthError::MissingEmail(format!(
            "email {} is not verified",
            claims.email
        )));
    }
    if claims.email.is_empty() {
        return Err(OAuthError::MissingEmail("no email claim".to_string()));
    }
    Ok(claims.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header as header_match, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn id_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    fn provider(server: &MockServer, profile: bool) -> OAuthProvider {
        let base = Url::parse(&server.uri()).unwrap();
        let data = ProviderData {
            provider_name: "Test".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            login_url: base.join("/auth").unwrap(),
            redeem_url: base.join("/token").unwrap(),
            validate_url: base.join("/tokeninfo").unwrap(),
            profile_url: profile.then(|| base.join("/userinfo").unwrap()),
            scope: "email".to_string(),
        };
        OAuthProvider::new(data, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_redeem_and_email_from_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_secret=client-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "id_token": id_token(serde_json::json!({"email": "jane@example.com", "email_verified": true})),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, false);
        let redemption = provider
            .redeem("https://proxy/oauth2/callback", "abc")
            .await
            .unwrap();
        assert_eq!(redemption.access_token, "at-1");

        let email = provider.email_address(&redemption).await.unwrap();
        assert_eq!(email, "jane@example.com");
    }

    #[tokio::test]
    async fn test_redeem_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .redeem("https://proxy/oauth2/callback", "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Backend(msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_redeem_missing_code_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(&server, false).redeem("r", "").await.unwrap_err();
        assert!(matches!(err, OAuthError::MissingCode));
    }

    #[tokio::test]
    async fn test_email_from_profile_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header_match("authorization", "Bearer at-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"email": "bob@example.com"})),
            )
            .mount(&server)
            .await;

        let redemption = Redemption {
            access_token: "at-2".to_string(),
            body: serde_json::json!({"access_token": "at-2"}),
        };
        let email = provider(&server, true)
            .email_address(&redemption)
            .await
            .unwrap();
        assert_eq!(email, "bob@example.com");
    }

    #[tokio::test]
    async fn test_email_missing_without_profile() {
        let server = MockServer::start().await;
        let redemption = Redemption {
            access_token: "at".to_string(),
            body: serde_json::json!({}),
        };
        assert!(matches!(
            provider(&server, false).email_address(&redemption).await,
            Err(OAuthError::MissingEmail(_))
        ));
    }

    #[test]
    fn test_unverified_email_rejected() {
        let token = id_token(serde_json::json!({"email": "x@example.com", "email_verified": false}));
        assert!(email_from_id_token(&token).is_err());
    }

    #[tokio::test]
    async fn test_validate_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("access_token", "good"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("access_token", "bad"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let provider = provider(&server, false);
        assert!(provider.validate_token("good").await);
        assert!(!provider.validate_token("bad").await);
        assert!(!provider.validate_token("").await);
    }

    #[test]
    fn test_google_defaults() {
        let data = OAuthProvider::google_data("id", "secret").unwrap();
        assert_eq!(data.provider_name, "Google");
        assert_eq!(data.scope, "profile email");
        assert_eq!(data.login_url.as_str(), GOOGLE_LOGIN_URL);
    }
}
