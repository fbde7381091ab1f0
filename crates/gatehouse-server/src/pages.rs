//! Sign-in and error pages.
//!
//! Built-in templates can be replaced by `sign_in.html` and/or `error.html`
//! in a custom templates directory. Output is HTML-escaped.

use std::path::Path;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use minijinja::Environment;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::Result;

pub const SIGN_IN_TEMPLATE: &str = "sign_in.html";
pub const ERROR_TEMPLATE: &str = "error.html";

const DEFAULT_SIGN_IN: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Sign In</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
<div class="signin">
<form method="GET" action="/oauth2/start">
<input type="hidden" name="rd" value="{{ redirect }}">
{% if sign_in_message %}<p>{{ sign_in_message }}</p>{% endif %}
<button type="submit">Sign in with {{ provider_name }}</button>
</form>
</div>
{% if custom_login %}
<div class="signin">
<form method="POST" action="/oauth2/sign_in">
<input type="hidden" name="rd" value="{{ redirect }}">
<label for="username">Username:</label>
<input type="text" name="username" id="username" size="10"><br>
<label for="password">Password:</label>
<input type="password" name="password" id="password" size="10"><br>
<button type="submit">Sign In</button>
</form>
</div>
{% endif %}
<footer>Secured with gatehouse {{ version }}</footer>
</body>
</html>
"#;

const DEFAULT_ERROR: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ title }}</title>
</head>
<body>
<h2>{{ title }}</h2>
<p>{{ message }}</p>
<hr>
<p><a href="/oauth2/sign_in">Sign In</a></p>
</body>
</html>
"#;

/// Values available to the sign-in template.
#[derive(Debug, Clone, Serialize)]
pub struct SignInContext<'a> {
    pub provider_name: &'a str,
    pub sign_in_message: Option<&'a str>,
    /// Show the username/password form.
    pub custom_login: bool,
    pub redirect: &'a str,
    pub version: &'a str,
}

#[derive(Serialize)]
struct ErrorContext<'a> {
    title: &'a str,
    message: &'a str,
}

/// Compiled page templates.
#[derive(Debug)]
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    /// Built-in templates only.
    pub fn new() -> Result<Self> {
        Self::load(None)
    }

    /// Built-in templates, overridden by any found in `custom_dir`.
    pub fn load(custom_dir: Option<&Path>) -> Result<Self> {
        let mut env = Environment::new();
        for (name, builtin) in [(SIGN_IN_TEMPLATE, DEFAULT_SIGN_IN), (ERROR_TEMPLATE, DEFAULT_ERROR)] {
            let source = custom_dir
                .map(|dir| dir.join(name))
                .filter(|path| path.is_file())
                .and_then(|path| match std::fs::read_to_string(&path) {
                    Ok(source) => {
                        debug!(path = %path.display(), "Using custom template");
                        Some(source)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to read custom template, using built-in");
                        None
                    }
                })
                .unwrap_or_else(|| builtin.to_string());
            env.add_template_owned(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render the sign-in page with `status`.
    pub fn sign_in(&self, status: StatusCode, context: &SignInContext<'_>) -> Response {
        match self.render(SIGN_IN_TEMPLATE, context) {
            Some(html) => (status, Html(html)).into_response(),
            None => (status, "Sign in required").into_response(),
        }
    }

    /// Render an error page titled `"<code> <title>"`.
    pub fn error(&self, status: StatusCode, title: &str, message: &str) -> Response {
        warn!(status = %status.as_u16(), title = %title, message = %message, "Error page");
        let title = format!("{} {}", status.as_u16(), title);
        let context = ErrorContext {
            title: &title,
            message,
        };
        match self.render(ERROR_TEMPLATE, &context) {
            Some(html) => (status, Html(html)).into_response(),
            None => (status, format!("{}\n{}", title, message)).into_response(),
        }
    }

    fn render<S: Serialize>(&self, name: &str, context: &S) -> Option<String> {
        let rendered = self
            .env
            .get_template(name)
            .and_then(|template| template.render(context));
        match rendered {
            Ok(html) => Some(html),
            Err(e) => {
                error!(template = %name, error = %e, "Failed to render template");
                None
            }
        }
    }
}
