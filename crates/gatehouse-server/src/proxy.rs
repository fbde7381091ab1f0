//! Per-request authentication.
//!
//! [`classify`] decides which branch a request takes from its path alone.
//! [`AuthProxy::serve`] then runs that branch. Precedence is fixed:
//!
//! 1. `/robots.txt` and `/ping`
//! 2. skip-auth patterns
//! 3. `/oauth2/sign_in`, `/oauth2/start`, `/oauth2/callback`
//! 4. session cookie
//! 5. HTTP Basic credentials, when a delegate is configured
//! 6. sign-in page with 403
//!
//! Cookie problems of any kind (bad signature, expiry, decrypt failure) are
//! indistinguishable from having no cookie.

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue, Method, Request, StatusCode,
        header::{self, IntoHeaderName},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeDelta, Utc};
use cookie::Cookie;
use cookie::time::OffsetDateTime;
use gatehouse_config::CALLBACK_PATH;
use gatehouse_oauth::{SharedPolicy, SharedProvider, authorization_url, is_relative_redirect};
use gatehouse_session::{Session, SessionCodec};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ServerOptions;
use crate::delegate::SharedValidator;
use crate::error::Result;
use crate::logging::RemoteAddr;
use crate::pages::{Pages, SignInContext};
use crate::upstream::{ForwardError, UPSTREAM_ADDRESS_HEADER, UpstreamRouter};

pub const ROBOTS_PATH: &str = "/robots.txt";
pub const PING_PATH: &str = "/ping";
pub const SIGN_IN_PATH: &str = "/oauth2/sign_in";
pub const OAUTH_START_PATH: &str = "/oauth2/start";
pub const OAUTH_CALLBACK_PATH: &str = CALLBACK_PATH;

/// Response header carrying the authenticated email, or user.
pub const AUTH_RESPONSE_HEADER: &str = "gap-auth";
pub const FORWARDED_USER_HEADER: &str = "x-forwarded-user";
pub const FORWARDED_EMAIL_HEADER: &str = "x-forwarded-email";
pub const FORWARDED_ACCESS_TOKEN_HEADER: &str = "x-forwarded-access-token";

const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Which branch a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Robots,
    Ping,
    /// Forwarded without any identity check.
    SkipAuth,
    SignIn,
    OAuthStart,
    OAuthCallback,
    /// Needs a session or Basic credentials.
    Protected,
}

/// Decide the branch for `path`.
pub fn classify(path: &str, skip_auth: &[Regex]) -> Dispatch {
    match path {
        ROBOTS_PATH => return Dispatch::Robots,
        PING_PATH => return Dispatch::Ping,
        _ => {}
    }

    if skip_auth.iter().any(|re| re.is_match(path)) {
        return Dispatch::SkipAuth;
    }

    match path {
        SIGN_IN_PATH => Dispatch::SignIn,
        OAUTH_START_PATH => Dispatch::OAuthStart,
        OAUTH_CALLBACK_PATH => Dispatch::OAuthCallback,
        _ => Dispatch::Protected,
    }
}

/// Form values from the query string and, for url-encoded POSTs, the body.
/// Body values come first.
#[derive(Debug, Default)]
struct FormValues(Vec<(String, String)>);

impl FormValues {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `rd` return path, `/` when absent or not same-site.
    fn redirect(&self) -> String {
        match self.get("rd") {
            Some(rd) if is_relative_redirect(rd) => rd.to_string(),
            _ => "/".to_string(),
        }
    }
}

/// The authenticating proxy.
#[derive(Debug)]
pub struct AuthProxy {
    options: ServerOptions,
    codec: SessionCodec,
    provider: SharedProvider,
    policy: SharedPolicy,
    validator: Option<SharedValidator>,
    upstreams: UpstreamRouter,
    pages: Pages,
}

impl AuthProxy {
    pub fn new(
        options: ServerOptions,
        provider: SharedProvider,
        policy: SharedPolicy,
        upstreams: UpstreamRouter,
    ) -> Result<Self> {
        let codec = SessionCodec::new(&options.cookie)?;
        let pages = Pages::load(options.custom_templates_dir.as_deref())?;
        let upstreams = upstreams.with_max_body_size(options.max_body_size);

        for re in &options.skip_auth_regex {
            info!(pattern = %re, "Compiled skip-auth regex");
        }
        let cookie = &options.cookie;
        info!(
            name = %cookie.name,
            secure = cookie.secure,
            http_only = cookie.http_only,
            expire_secs = cookie.expire.as_secs(),
            refresh_secs = cookie.refresh.as_secs(),
            domain = %cookie.domain.as_deref().unwrap_or("<default>"),
            encrypted = codec.is_encrypted(),
            "Cookie settings"
        );
        info!(
            provider = %provider.data().provider_name,
            client_id = %provider.data().client_id,
            "OAuth provider"
        );

        Ok(Self {
            options,
            codec,
            provider,
            policy,
            validator: None,
            upstreams,
            pages,
        })
    }

    /// Accept Basic credentials and the sign-in form, checked by `validator`.
    pub fn with_validator(mut self, validator: SharedValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn upstreams(&self) -> &UpstreamRouter {
        &self.upstreams
    }

    /// Handle one request.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let remote = RemoteAddr::from_request(&request);

        match classify(request.uri().path(), &self.options.skip_auth_regex) {
            Dispatch::Robots => (StatusCode::OK, ROBOTS_TXT).into_response(),
            Dispatch::Ping => (StatusCode::OK, "OK").into_response(),
            Dispatch::SkipAuth => self.forward(request, &remote).await,
            Dispatch::SignIn => self.serve_sign_in(request, &remote).await,
            Dispatch::OAuthStart => self.serve_oauth_start(request).await,
            Dispatch::OAuthCallback => self.serve_oauth_callback(request, &remote).await,
            Dispatch::Protected => self.serve_protected(request, &remote).await,
        }
    }

    async fn serve_sign_in(&self, request: Request<Body>, remote: &RemoteAddr) -> Response {
        let (parts, form) = match self.read_form(request).await {
            Ok(read) => read,
            Err(response) => return response,
        };

        if let Some(user) = self.manual_sign_in(&parts.method, &form).await {
            info!(remote = %remote, user = %user, "Authenticated via manual sign in");
            return self.issue_session(&parts.headers, &Session::from_user(user), &form.redirect());
        }

        self.sign_in_page(&parts, StatusCode::OK)
    }

    async fn manual_sign_in(&self, method: &Method, form: &FormValues) -> Option<String> {
        if method != Method::POST {
            return None;
        }
        let validator = self.validator.as_ref()?;
        let user = form.get("username").filter(|u| !u.is_empty())?;
        let password = form.get("password").unwrap_or_default();
        validator
            .validate(user, password)
            .await
            .then(|| user.to_string())
    }

    async fn serve_oauth_start(&self, request: Request<Body>) -> Response {
        let (parts, form) = match self.read_form(request).await {
            Ok(read) => read,
            Err(response) => return response,
        };

        let url = authorization_url(
            self.provider.data(),
            &self.redirect_uri(&parts.headers),
            &form.redirect(),
        );
        self.found(url.as_str(), None)
    }

    async fn serve_oauth_callback(&self, request: Request<Body>, remote: &RemoteAddr) -> Response {
        let (parts, form) = match self.read_form(request).await {
            Ok(read) => read,
            Err(response) => return response,
        };

        if let Some(error) = form.get("error").filter(|e| !e.is_empty()) {
            return self
                .pages
                .error(StatusCode::FORBIDDEN, "Permission Denied", error);
        }

        let redirect_uri = self.redirect_uri(&parts.headers);
        let code = form.get("code").unwrap_or_default();
        let (access_token, email) = match self.redeem_code(&redirect_uri, code).await {
            Ok(redeemed) => redeemed,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Error redeeming code");
                return self.pages.error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Error",
                    &e.to_string(),
                );
            }
        };

        let redirect = form
            .get("state")
            .filter(|state| is_relative_redirect(state))
            .unwrap_or("/");

        if !self.policy.authorize(&email) {
            info!(remote = %remote, email = %email, "Permission denied");
            return self
                .pages
                .error(StatusCode::FORBIDDEN, "Permission Denied", "Invalid Account");
        }

        info!(remote = %remote, email = %email, "Authentication completed");
        // The token only goes into the cookie when the client cannot read it.
        let access_token = if self.codec.is_encrypted() {
            access_token
        } else {
            String::new()
        };
        self.issue_session(
            &parts.headers,
            &Session::from_email(email, access_token),
            redirect,
        )
    }

    async fn redeem_code(
        &self,
        redirect_uri: &str,
        code: &str,
    ) -> gatehouse_oauth::Result<(String, String)> {
        let redemption = self.provider.redeem(redirect_uri, code).await?;
        let email = self.provider.email_address(&redemption).await?;
        Ok((redemption.access_token, email))
    }

    async fn serve_protected(&self, request: Request<Body>, remote: &RemoteAddr) -> Response {
        let (mut parts, body) = request.into_parts();

        let (session, refreshed) = match self.session_from_cookie(&parts.headers, remote).await {
            Some(found) => found,
            None => match self.basic_auth_user(&parts.headers, remote).await {
                Some(user) => (Session::from_user(user), None),
                None => return self.sign_in_page(&parts, StatusCode::FORBIDDEN),
            },
        };

        self.attach_identity(&mut parts.headers, &session);
        let mut response = self.forward(Request::from_parts(parts, body), remote).await;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(session.display_name()) {
            headers.insert(AUTH_RESPONSE_HEADER, value);
        }
        if let Some(cookie) = refreshed {
            headers.append(header::SET_COOKIE, cookie);
        }
        response
    }

    /// The session in the request cookie, plus a replacement cookie when it
    /// was refreshed.
    async fn session_from_cookie(
        &self,
        headers: &HeaderMap,
        remote: &RemoteAddr,
    ) -> Option<(Session, Option<HeaderValue>)> {
        let value = cookie_value(headers, &self.options.cookie.name)?;
        let now = Utc::now();

        let decoded = match self.codec.decode(&value, now) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(remote = %remote, error = %e, "Ignoring session cookie");
                return None;
            }
        };

        if !self.options.cookie.needs_refresh(decoded.issued_at, now) {
            return Some((decoded.session, None));
        }

        let session = decoded.session;
        let still_valid = self.policy.authorize(&session.email)
            && self.provider.validate_token(&session.access_token).await;
        if !still_valid {
            info!(remote = %remote, user = %session.display_name(), "Session failed re-validation");
            return None;
        }

        let refreshed = match self.codec.encode(&session, now) {
            Ok(value) => self.make_cookie(headers, value, self.options.cookie.expires_at(now)),
            Err(e) => {
                warn!(error = %e, "Failed to re-encode session");
                None
            }
        };
        debug!(remote = %remote, user = %session.display_name(), "Refreshed session cookie");
        Some((session, refreshed))
    }

    async fn basic_auth_user(&self, headers: &HeaderMap, remote: &RemoteAddr) -> Option<String> {
        let validator = self.validator.as_ref()?;
        let (user, password) = basic_credentials(headers)?;
        if validator.validate(&user, &password).await {
            info!(remote = %remote, user = %user, "Authenticated via basic auth");
            Some(user)
        } else {
            None
        }
    }

    fn attach_identity(&self, headers: &mut HeaderMap, session: &Session) {
        for name in [
            FORWARDED_USER_HEADER,
            FORWARDED_EMAIL_HEADER,
            FORWARDED_ACCESS_TOKEN_HEADER,
        ] {
            headers.remove(name);
        }

        if self.options.pass_basic_auth {
            let credentials = STANDARD.encode(format!("{}:", session.user));
            set_header(headers, header::AUTHORIZATION, &format!("Basic {}", credentials));
            set_header(headers, FORWARDED_USER_HEADER, &session.user);
            set_header(headers, FORWARDED_EMAIL_HEADER, &session.email);
        }
        if self.options.pass_access_token {
            set_header(headers, FORWARDED_ACCESS_TOKEN_HEADER, &session.access_token);
        }
    }

    async fn forward(&self, request: Request<Body>, remote: &RemoteAddr) -> Response {
        match self.upstreams.forward(request, remote).await {
            Ok(response) => response,
            Err(ForwardError::NoRoute(path)) => self.pages.error(
                StatusCode::NOT_FOUND,
                "Not Found",
                &format!("No upstream for {}", path),
            ),
            Err(e @ ForwardError::BodyTooLarge(_)) => {
                self.pages
                    .error(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", &e.to_string())
            }
            Err(ForwardError::Upstream { address, source }) => {
                warn!(remote = %remote, upstream = %address, error = %source, "Upstream request failed");
                let mut response = self.pages.error(
                    StatusCode::BAD_GATEWAY,
                    "Bad Gateway",
                    "The upstream service is unavailable",
                );
                if let Ok(value) = HeaderValue::from_str(&address) {
                    response.headers_mut().insert(UPSTREAM_ADDRESS_HEADER, value);
                }
                response
            }
        }
    }

    /// Split the request and collect its form values.
    async fn read_form(
        &self,
        request: Request<Body>,
    ) -> std::result::Result<(Parts, FormValues), Response> {
        let (parts, body) = request.into_parts();
        let mut values = Vec::new();

        let is_form = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
        if parts.method == Method::POST && is_form {
            let bytes = axum::body::to_bytes(body, self.options.max_body_size)
                .await
                .map_err(|e| {
                    self.pages.error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Error",
                        &e.to_string(),
                    )
                })?;
            values.extend(url::form_urlencoded::parse(&bytes).into_owned());
        }
        if let Some(query) = parts.uri.query() {
            values.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }

        Ok((parts, FormValues(values)))
    }

    fn sign_in_page(&self, parts: &Parts, status: StatusCode) -> Response {
        let request_uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let redirect = if request_uri == SIGN_IN_PATH {
            "/"
        } else {
            request_uri
        };

        let context = SignInContext {
            provider_name: &self.provider.data().provider_name,
            sign_in_message: self.options.sign_in_message.as_deref(),
            custom_login: self.options.display_htpasswd_form && self.validator.is_some(),
            redirect,
            version: VERSION,
        };
        let mut response = self.pages.sign_in(status, &context);
        if let Some(clear) = self.clear_cookie(&parts.headers) {
            response.headers_mut().append(header::SET_COOKIE, clear);
        }
        response
    }

    /// Set a fresh session cookie and redirect.
    fn issue_session(&self, headers: &HeaderMap, session: &Session, redirect: &str) -> Response {
        let now = Utc::now();
        match self.codec.encode(session, now) {
            Ok(value) => {
                let cookie = self.make_cookie(headers, value, self.options.cookie.expires_at(now));
                self.found(redirect, cookie)
            }
            Err(e) => self.pages.error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Error",
                &e.to_string(),
            ),
        }
    }

    fn found(&self, location: &str, cookie: Option<HeaderValue>) -> Response {
        let Ok(location) = HeaderValue::from_str(location) else {
            return self.pages.error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Error",
                "Invalid redirect target",
            );
        };
        let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
        if let Some(cookie) = cookie {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }

    /// Callback URL handed to the provider.
    fn redirect_uri(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.options.redirect_url {
            return url.to_string();
        }
        let scheme = if self.options.cookie.secure {
            "https"
        } else {
            "http"
        };
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        format!("{}://{}{}", scheme, host, OAUTH_CALLBACK_PATH)
    }

    fn clear_cookie(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let past = Utc::now() - TimeDelta::hours(1);
        self.make_cookie(headers, String::new(), past)
    }

    fn make_cookie(
        &self,
        headers: &HeaderMap,
        value: String,
        expires: DateTime<Utc>,
    ) -> Option<HeaderValue> {
        let config = &self.options.cookie;
        let mut builder = Cookie::build((config.name.clone(), value))
            .path("/")
            .http_only(config.http_only)
            .secure(config.secure);

        let host = request_host(headers);
        match &config.domain {
            Some(domain) => {
                if !host.ends_with(domain.as_str()) {
                    warn!(host = %host, domain = %domain, "Request host does not match cookie domain");
                }
                builder = builder.domain(domain.clone());
            }
            None if !host.is_empty() => builder = builder.domain(host.to_string()),
            None => {}
        }
        if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires.timestamp()) {
            builder = builder.expires(expires);
        }

        HeaderValue::from_str(&builder.build().to_string()).ok()
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if scheme != "Basic" {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// `Host` header without the port.
fn request_host(headers: &HeaderMap) -> &str {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn set_header<K: IntoHeaderName>(headers: &mut HeaderMap, name: K, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
