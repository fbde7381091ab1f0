//! Authorization URL construction.

use url::Url;

use crate::provider::ProviderData;

/// Base used to check where a browser would resolve a return path.
const REDIRECT_CHECK_BASE: &str = "http://gatehouse.invalid/";

/// Whether `redirect` is a same-site path that is safe to bounce back to.
///
/// Absolute URLs and protocol-relative `//host` forms are rejected so the
/// `state` parameter cannot be turned into an open redirect. Browsers drop
/// tabs and newlines while parsing URLs, so any control character or
/// whitespace rejects the path outright.
pub fn is_relative_redirect(redirect: &str) -> bool {
    if !redirect.starts_with('/') || redirect.starts_with("//") || redirect.starts_with("/\\") {
        return false;
    }
    if redirect
        .chars()
        .any(|c| c.is_control() || c.is_whitespace())
    {
        return false;
    }

    let Ok(base) = Url::parse(REDIRECT_CHECK_BASE) else {
        return false;
    };
    base.join(redirect)
        .is_ok_and(|resolved| resolved.origin() == base.origin())
}

/// Build the URL the browser is sent to in order to start the handshake.
///
/// `redirect` becomes the `state` parameter only when it is a relative path.
pub fn authorization_url(data: &ProviderData, redirect_uri: &str, redirect: &str) -> Url {
    let mut url = data.login_url.clone();
    {
        let mut params = url.query_pairs_mut();
        params
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("approval_prompt", "force")
            .append_pair("scope", &data.scope)
            .append_pair("client_id", &data.client_id)
            .append_pair("response_type", "code");
        if is_relative_redirect(redirect) {
            params.append_pair("state", redirect);
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> ProviderData {
        ProviderData {
            provider_name: "Google".to_string(),
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            login_url: Url::parse("https://accounts.example.com/o/oauth2/auth").unwrap(),
            redeem_url: Url::parse("https://accounts.example.com/o/oauth2/token").unwrap(),
            validate_url: Url::parse("https://accounts.example.com/tokeninfo").unwrap(),
            profile_url: None,
            scope: "profile email".to_string(),
        }
    }

    fn params(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_authorization_url_params() {
        let url = authorization_url(&data(), "https://proxy.example.com/oauth2/callback", "/app");
        assert!(url.as_str().starts_with("https://accounts.example.com/o/oauth2/auth?"));

        let params = params(&url);
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("redirect_uri"), Some("https://proxy.example.com/oauth2/callback"));
        assert_eq!(get("approval_prompt"), Some("force"));
        assert_eq!(get("scope"), Some("profile email"));
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("state"), Some("/app"));
    }

    #[test]
    fn test_foreign_redirect_not_embedded() {
        for redirect in ["https://evil.example.com/", "//evil.example.com/x", "", "app"] {
            let url = authorization_url(&data(), "https://p/oauth2/callback", redirect);
            assert!(
                !params(&url).iter().any(|(k, _)| k == "state"),
                "{redirect:?} leaked into state"
            );
        }
    }

    #[test]
    fn test_is_relative_redirect() {
        assert!(is_relative_redirect("/"));
        assert!(is_relative_redirect("/a/b?c=d"));
        assert!(!is_relative_redirect("//evil"));
        assert!(!is_relative_redirect("/\\evil"));
        assert!(!is_relative_redirect("http://evil"));
    }

    #[test]
    fn test_whitespace_smuggled_redirects_rejected() {
        for redirect in [
            "/\t/evil.example.org",
            "/\n/evil.example.org",
            "/\r/evil.example.org",
            "/\\\t\\evil.example.org",
            "/ /evil.example.org",
            "/app\u{0}",
        ] {
            assert!(!is_relative_redirect(redirect), "{redirect:?} accepted");
            let url = authorization_url(&data(), "https://p/oauth2/callback", redirect);
            assert!(
                !params(&url).iter().any(|(k, _)| k == "state"),
                "{redirect:?} leaked into state"
            );
        }
        assert!(is_relative_redirect("/app/%09/x?q=%20"));
    }
}
