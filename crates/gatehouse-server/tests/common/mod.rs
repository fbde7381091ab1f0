//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{Json, Router, http::HeaderMap, routing::any};
use gatehouse_oauth::{EmailDomains, OAuthProvider};
use gatehouse_server::{AuthProxy, DelegatedValidator, Server, ServerOptions, UpstreamRouter};
use gatehouse_session::CookieConfig;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

pub const COOKIE_SECRET: &str = "integration-test-cookie-secret!!";

/// Upstream that echoes the identity headers it received as JSON.
pub struct EchoUpstream {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl EchoUpstream {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = Router::new().fallback(any(|uri: axum::http::Uri, headers: HeaderMap| async move {
            let get = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            Json(serde_json::json!({
                "uri": uri.to_string(),
                "host": get("host"),
                "user": get("x-forwarded-user"),
                "email": get("x-forwarded-email"),
                "token": get("x-forwarded-access-token"),
                "authorization": get("authorization"),
            }))
        }));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("valid upstream url")
    }
}

/// A proxy running in the background.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestProxy {
    /// Start a proxy in front of `upstream`, delegating Basic auth to `delegate`.
    pub async fn start(upstream: Url, delegate: Url) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let cookie = CookieConfig::new(COOKIE_SECRET).with_secure(false);
        let options = ServerOptions::new(cookie)
            .with_bind_address(addr)
            .with_request_logging(false);

        let provider = OAuthProvider::new(
            OAuthProvider::google_data("client-id", "client-secret")?,
            Duration::from_secs(5),
        )?;
        let validator = DelegatedValidator::new(delegate, Duration::from_secs(5))?;
        let proxy = AuthProxy::new(
            options,
            Arc::new(provider),
            Arc::new(EmailDomains::new(["example.com"])),
            UpstreamRouter::new(&[upstream], false)?,
        )?
        .with_validator(Arc::new(validator));

        let (tx, rx) = oneshot::channel();
        let server = Server::new(proxy);
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the proxy and wait for it to exit.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle).await??;
        }
        Ok(())
    }
}

/// Wait for the server to answer `/ping`.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/ping", addr);
    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await
            && resp.status().is_success()
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("proxy at {} did not become ready", addr)
}
