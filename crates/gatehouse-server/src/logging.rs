//! Client address extraction and request logging middleware.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};

/// Header a fronting load balancer sets to the original client IP.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Where a request came from, for logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAddr {
    pub peer: Option<SocketAddr>,
    pub real_ip: Option<String>,
}

impl RemoteAddr {
    pub fn from_request<B>(request: &axum::http::Request<B>) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let real_ip = request
            .headers()
            .get(REAL_IP_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Self { peer, real_ip }
    }

    /// Peer IP, used for `X-Forwarded-For`.
    pub fn ip(&self) -> Option<IpAddr> {
        self.peer.map(|addr| addr.ip())
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer {
            Some(addr) => write!(f, "{}", addr)?,
            None => write!(f, "-")?,
        }
        if let Some(real_ip) = &self.real_ip {
            write!(f, " ({:?})", real_ip)?;
        }
        Ok(())
    }
}

/// Log method, path, status and duration of every request.
pub async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let remote = RemoteAddr::from_request(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            remote = %remote,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            remote = %remote,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            remote = %remote,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
