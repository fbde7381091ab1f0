//! The identity carried by a session cookie.

use serde::{Deserialize, Serialize};

/// Identity and provider token carried in the session cookie.
///
/// `email` is empty for sessions established with a delegated credential.
/// A session with neither `email` nor `user` is never valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

impl Session {
    /// Session for an OAuth identity. The user is the local part of the email.
    pub fn from_email(email: impl Into<String>, access_token: impl Into<String>) -> Self {
        let email = email.into();
        let user = email
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&email)
            .to_string();
        Self {
            email,
            user,
            access_token: access_token.into(),
        }
    }

    /// Session for a delegated-credential identity (no email, no token).
    pub fn from_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    /// Whether this session names anyone at all.
    pub fn is_valid(&self) -> bool {
        !(self.email.is_empty() && self.user.is_empty())
    }

    /// Name reported in the auth summary header: email if present, else user.
    pub fn display_name(&self) -> &str {
        if self.email.is_empty() {
            &self.user
        } else {
            &self.email
        }
    }
}
