//! Path-based routing to upstream services and request forwarding.
//!
//! Each upstream URL's path is its mount point. A mount ending in `/` matches
//! its whole subtree; any other mount matches exactly. The longest matching
//! mount wins.
//!
//! Requests are forwarded with the raw request target, so percent-encoded
//! slashes reach the upstream untouched.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, header},
    response::Response,
};
use reqwest::Client;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::error::{Result, ServerError};
use crate::logging::RemoteAddr;

/// Response header naming the upstream that served the request.
pub const UPSTREAM_ADDRESS_HEADER: &str = "gap-upstream-address";

/// Default cap on buffered request bodies (10 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// One mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Mount path, `/` when the configured URL had none.
    pub path: String,
    /// Scheme and authority requests are sent to.
    pub origin: Url,
    /// `host[:port]` of the upstream.
    pub address: String,
}

impl Upstream {
    fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ServerError::Config(format!("Upstream {} has no host", url)))?;
        let address = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        let mut origin = url.clone();
        origin.set_path("");
        origin.set_query(None);
        origin.set_fragment(None);

        Ok(Self {
            path,
            origin,
            address,
        })
    }

    fn matches(&self, path: &str) -> bool {
        if self.path.ends_with('/') {
            path.starts_with(&self.path)
        } else {
            path == self.path
        }
    }

    fn target(&self, path_and_query: &str) -> String {
        format!("{}://{}{}", self.origin.scheme(), self.address, path_and_query)
    }
}

/// Why a request could not be forwarded.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no upstream for {0}")]
    NoRoute(String),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("upstream {address} failed: {source}")]
    Upstream {
        address: String,
        source: reqwest::Error,
    },
}

/// Immutable route table plus the HTTP client used to reach upstreams.
#[derive(Debug, Clone)]
pub struct UpstreamRouter {
    routes: Vec<Upstream>,
    client: Client,
    pass_host_header: bool,
    max_body_size: usize,
}

impl UpstreamRouter {
    /// Build a router from upstream URLs.
    ///
    /// With `pass_host_header` the inbound `Host` is kept; otherwise it is
    /// rewritten to the upstream's address.
    pub fn new(upstreams: &[Url], pass_host_header: bool) -> Result<Self> {
        let mut routes = upstreams
            .iter()
            .map(Upstream::from_url)
            .collect::<Result<Vec<_>>>()?;
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        for route in &routes {
            info!(path = %route.path, upstream = %route.origin, "Mapping path to upstream");
        }

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ServerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            routes,
            client,
            pass_host_header,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        })
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Routes, longest mount first.
    pub fn routes(&self) -> &[Upstream] {
        &self.routes
    }

    /// The upstream serving `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&Upstream> {
        self.routes.iter().find(|route| route.matches(path))
    }

    /// Forward a request to its upstream and stream the response back.
    pub async fn forward(
        &self,
        request: Request<Body>,
        remote: &RemoteAddr,
    ) -> std::result::Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let upstream = self
            .resolve(parts.uri.path())
            .ok_or_else(|| ForwardError::NoRoute(parts.uri.path().to_string()))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = upstream.target(path_and_query);

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::HOST);
        if self.pass_host_header {
            if let Some(host) = parts.headers.get(header::HOST) {
                headers.insert(header::HOST, host.clone());
            }
        }
        if let Some(ip) = remote.ip() {
            append_forwarded_for(&mut headers, &ip.to_string());
        }

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|_| ForwardError::BodyTooLarge(self.max_body_size))?;

        let upstream_response = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| ForwardError::Upstream {
                address: upstream.address.clone(),
                source,
            })?;

        let status = upstream_response.status();
        let mut response_headers = strip_hop_by_hop(upstream_response.headers());
        if let Ok(value) = HeaderValue::from_str(&upstream.address) {
            response_headers.insert(UPSTREAM_ADDRESS_HEADER, value);
        }

        let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter() {
        out.remove(name);
    }
    out.remove("keep-alive");
    out
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
