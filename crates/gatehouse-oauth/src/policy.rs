//! Email authorization predicate.

use std::collections::HashSet;
use std::sync::Arc;

/// Decides whether an authenticated email is allowed through.
pub trait AuthorizationPolicy: Send + Sync + std::fmt::Debug {
    fn authorize(&self, email: &str) -> bool;
}

/// Thread-safe shared policy.
pub type SharedPolicy = Arc<dyn AuthorizationPolicy>;

/// Allow-list of email domains, plus individually allowed addresses.
///
/// The domain `*` allows every non-empty email.
#[derive(Debug, Clone, Default)]
pub struct EmailDomains {
    suffixes: Vec<String>,
    emails: HashSet<String>,
    allow_all: bool,
}

impl EmailDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for domain in domains {
            let domain = domain.as_ref().trim().trim_start_matches('@').to_lowercase();
            if domain == "*" {
                policy.allow_all = true;
            } else if !domain.is_empty() {
                policy.suffixes.push(format!("@{domain}"));
            }
        }
        policy
    }

    /// Also allow these exact addresses regardless of domain.
    pub fn with_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.emails
            .extend(emails.into_iter().map(|e| e.as_ref().trim().to_lowercase()));
        self
    }
}

impl AuthorizationPolicy for EmailDomains {
    fn authorize(&self, email: &str) -> bool {
        if email.is_empty() {
            return false;
        }
        if self.allow_all {
            return true;
        }
        let email = email.to_lowercase();
        self.emails.contains(&email) || self.suffixes.iter().any(|s| email.ends_with(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_match() {
        let policy = EmailDomains::new(["example.com"]);
        assert!(policy.authorize("jane@example.com"));
        assert!(policy.authorize("Jane@Example.COM"));
        assert!(!policy.authorize("jane@evilexample.com"));
        assert!(!policy.authorize("jane@example.com.evil"));
    }

    #[test]
    fn test_wildcard() {
        let policy = EmailDomains::new(["*"]);
        assert!(policy.authorize("anyone@anywhere.org"));
        assert!(!policy.authorize(""));
    }

    #[test]
    fn test_explicit_emails() {
        let policy = EmailDomains::new(["example.com"]).with_emails(["contractor@other.org"]);
        assert!(policy.authorize("contractor@other.org"));
        assert!(!policy.authorize("someone@other.org"));
    }

    #[test]
    fn test_empty_policy_denies() {
        let policy = EmailDomains::new(Vec::<String>::new());
        assert!(!policy.authorize("jane@example.com"));
    }
}
