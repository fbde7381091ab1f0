//! Authenticating reverse proxy.
//!
//! Sits in front of upstream HTTP services and requires every request to
//! carry a signed session cookie, obtained through an OAuth provider, or
//! HTTP Basic credentials accepted by a delegated validator.
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_config::load_config;
//! use gatehouse_server::Server;
//!
//! let config = load_config(None)?.config.validate()?;
//! Server::from_config(&config)?.run().await?;
//! ```

pub mod cache;
pub mod config;
pub mod delegate;
pub mod error;
pub mod logging;
pub mod pages;
pub mod proxy;
pub mod upstream;

pub use cache::{CREDENTIAL_TTL, CredentialCache, MAX_CACHED_CREDENTIALS};
pub use config::ServerOptions;
pub use delegate::{CredentialValidator, DelegatedValidator, SharedValidator};
pub use error::{Result, ServerError};
pub use logging::{RemoteAddr, request_logging_middleware};
pub use proxy::{AuthProxy, Dispatch, classify};
pub use upstream::{Upstream, UpstreamRouter};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    middleware,
    response::Response,
};
use gatehouse_config::{ValidatedConfig, ValidatedProvider};
use gatehouse_oauth::{EmailDomains, OAuthProvider, ProviderData};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The gatehouse HTTP server.
pub struct Server {
    proxy: Arc<AuthProxy>,
}

impl Server {
    pub fn new(proxy: AuthProxy) -> Self {
        Self {
            proxy: Arc::new(proxy),
        }
    }

    /// Build the proxy and its collaborators from validated configuration.
    pub fn from_config(config: &ValidatedConfig) -> Result<Self> {
        let provider = OAuthProvider::new(provider_data(&config.provider)?, config.timeout)?;
        let policy = EmailDomains::new(&config.email_domains)
            .with_emails(&config.authenticated_emails);
        let upstreams = UpstreamRouter::new(&config.upstreams, config.pass_host_header)?;

        let mut proxy = AuthProxy::new(
            ServerOptions::from_config(config),
            Arc::new(provider),
            Arc::new(policy),
            upstreams,
        )?;

        if let Some(url) = &config.delegated_auth_url {
            info!(url = %url, "Delegating basic auth");
            let validator = DelegatedValidator::new(url.clone(), config.timeout)?;
            proxy = proxy.with_validator(Arc::new(validator));
        }

        Ok(Self::new(proxy))
    }

    /// Build the router. Every path goes through the proxy.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .fallback(proxy_handler)
            .with_state(self.proxy.clone());

        if self.proxy.options().request_logging {
            router = router.layer(middleware::from_fn(request_logging_middleware));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.bind_address();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an existing listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(format!("Failed to read local address: {}", e)))?;
        info!("Starting server on {}", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.proxy.options().bind_address
    }
}

async fn proxy_handler(State(proxy): State<Arc<AuthProxy>>, request: Request<Body>) -> Response {
    proxy.serve(request).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

/// Google's endpoints with any configured overrides applied.
fn provider_data(provider: &ValidatedProvider) -> Result<ProviderData> {
    let mut data = OAuthProvider::google_data(&provider.client_id, &provider.client_secret)?;
    if let Some(name) = &provider.name {
        data.provider_name = name.clone();
    }
    if let Some(url) = &provider.login_url {
        data.login_url = url.clone();
    }
    if let Some(url) = &provider.redeem_url {
        data.redeem_url = url.clone();
    }
    if let Some(url) = &provider.validate_url {
        data.validate_url = url.clone();
    }
    if let Some(url) = &provider.profile_url {
        data.profile_url = Some(url.clone());
    }
    if let Some(scope) = &provider.scope {
        data.scope = scope.clone();
    }
    Ok(data)
}
