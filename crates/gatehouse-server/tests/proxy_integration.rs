//! End-to-end tests: client -> proxy -> upstream, with a mocked delegate.

mod common;

use anyhow::Result;
use common::{EchoUpstream, TestProxy};
use reqwest::StatusCode;
use url::Url;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("testuser:asdf")
const TESTUSER_ASDF: &str = "Basic dGVzdHVzZXI6YXNkZg==";

async fn delegate() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", TESTUSER_ASDF))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_diagnostics_need_no_auth() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    let resp = proxy.client.get(proxy.url("/robots.txt")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "User-agent: *\nDisallow: /");

    let resp = proxy.client.get(proxy.url("/ping")).send().await?;
    assert_eq!(resp.text().await?, "OK");

    proxy.stop().await
}

#[tokio::test]
async fn test_anonymous_request_is_denied() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    let resp = proxy.client.get(proxy.url("/dashboard")).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get("gap-upstream-address").is_none());
    assert!(resp.text().await?.contains("Sign in with Google"));

    proxy.stop().await
}

#[tokio::test]
async fn test_basic_auth_reaches_upstream_with_identity() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    let resp = proxy
        .client
        .get(proxy.url("/files/a%2Fb?q=1"))
        .basic_auth("testuser", Some("asdf"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["gap-auth"], "testuser");
    assert_eq!(
        resp.headers()["gap-upstream-address"],
        upstream.addr.to_string().as_str()
    );

    let echoed: serde_json::Value = resp.json().await?;
    assert_eq!(echoed["uri"], "/files/a%2Fb?q=1");
    assert_eq!(echoed["user"], "testuser");
    assert_eq!(echoed["email"], "");
    // base64("testuser:")
    assert_eq!(echoed["authorization"], "Basic dGVzdHVzZXI6");
    // Host rewritten to the upstream.
    assert_eq!(echoed["host"], upstream.addr.to_string());

    proxy.stop().await
}

#[tokio::test]
async fn test_delegate_probes_are_cached() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    for _ in 0..3 {
        let resp = proxy
            .client
            .get(proxy.url("/"))
            .basic_auth("testuser", Some("asdf"))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    for _ in 0..2 {
        let resp = proxy
            .client
            .get(proxy.url("/"))
            .basic_auth("testuser", Some("wrong"))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    // One probe for the good pair, one per bad attempt.
    let probes = delegate.received_requests().await.unwrap_or_default();
    assert_eq!(probes.len(), 3);

    proxy.stop().await
}

#[tokio::test]
async fn test_manual_sign_in_cookie_grants_access() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    let resp = proxy
        .client
        .post(proxy.url("/oauth2/sign_in"))
        .form(&[("username", "testuser"), ("password", "asdf"), ("rd", "/home")])
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()["location"], "/home");

    let set_cookie = resp.headers()["set-cookie"].to_str()?.to_string();
    let pair = set_cookie.split(';').next().unwrap_or_default().to_string();
    assert!(pair.starts_with("_oauthproxy="));

    let resp = proxy
        .client
        .get(proxy.url("/home"))
        .header("cookie", pair)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: serde_json::Value = resp.json().await?;
    assert_eq!(echoed["user"], "testuser");

    proxy.stop().await
}

#[tokio::test]
async fn test_oauth_start_points_at_provider() -> Result<()> {
    let upstream = EchoUpstream::start().await?;
    let delegate = delegate().await;
    let proxy = TestProxy::start(upstream.url(), Url::parse(&delegate.uri())?).await?;

    let resp = proxy
        .client
        .get(proxy.url("/oauth2/start?rd=%2Freports"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let location = Url::parse(resp.headers()["location"].to_str()?)?;
    assert_eq!(location.host_str(), Some("accounts.google.com"));
    let expected_callback = format!("http://{}/oauth2/callback", proxy.addr);
    assert!(
        location
            .query_pairs()
            .any(|(k, v)| k == "redirect_uri" && v == expected_callback.as_str())
    );
    assert!(location.query_pairs().any(|(k, v)| k == "state" && v == "/reports"));

    proxy.stop().await
}
