//! Short-lived memo of validated credentials.
//!
//! Entries expire after [`CREDENTIAL_TTL`]. When the map grows past
//! [`MAX_CACHED_CREDENTIALS`] the whole cache is dropped on the next lookup
//! rather than evicting selectively.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// How long a successful validation is trusted.
pub const CREDENTIAL_TTL: Duration = Duration::from_secs(60);

/// Size past which the cache is reset.
pub const MAX_CACHED_CREDENTIALS: usize = 100;

/// TTL-bounded set of `(user, password)` pairs known to be valid.
#[derive(Debug)]
pub struct CredentialCache {
    entries: Mutex<HashMap<(String, String), Instant>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_limits(CREDENTIAL_TTL, MAX_CACHED_CREDENTIALS)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Whether the pair was validated within the TTL.
    pub fn contains(&self, user: &str, password: &str) -> bool {
        self.contains_at(user, password, Instant::now())
    }

    /// [`contains`](Self::contains) with an explicit clock.
    pub fn contains_at(&self, user: &str, password: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        if entries.len() > self.max_entries {
            debug!(entries = entries.len(), "Credential cache over capacity, resetting");
            entries.clear();
            return false;
        }

        let key = (user.to_string(), password.to_string());
        match entries.get(&key) {
            Some(validated_at) if now.saturating_duration_since(*validated_at) < self.ttl => true,
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Record a successful validation.
    pub fn insert(&self, user: &str, password: &str) {
        self.insert_at(user, password, Instant::now());
    }

    pub fn insert_at(&self, user: &str, password: &str, now: Instant) {
        self.entries
            .lock()
            .insert((user.to_string(), password.to_string()), now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
