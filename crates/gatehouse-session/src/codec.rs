//! Session cookie encoding.
//!
//! Wire format: `payload|timestamp|signature`, where
//! - `payload` is URL-safe base64 of the JSON session, or of
//!   `nonce || AES-256-GCM(json)` when encryption is enabled
//! - `timestamp` is the issue time in Unix seconds
//! - `signature` is URL-safe base64 of HMAC-SHA256 over
//!   `name|payload|timestamp` keyed with the cookie secret
//!
//! Decoding verifies the signature first, then the timestamp window, then
//! decrypts, then parses. Nothing in the payload is looked at before the
//! signature checks out.

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use aws_lc_rs::{hkdf, hmac};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::config::{CookieConfig, MIN_CIPHER_SECRET_LEN, to_delta};
use crate::error::{Result, SessionError};
use crate::session::Session;

/// Allowed clock skew for cookies stamped in the future, in seconds.
const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

const HKDF_SALT: &[u8] = b"gatehouse-session-cookie";
const HKDF_INFO: &[u8] = b"aes-256-gcm";

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub session: Session,
    pub issued_at: DateTime<Utc>,
}

/// Signs, and optionally encrypts, session cookies.
pub struct SessionCodec {
    name: String,
    signing_key: hmac::Key,
    cipher: Option<LessSafeKey>,
    max_age: TimeDelta,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("name", &self.name)
            .field("encrypted", &self.cipher.is_some())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Build a codec from cookie settings.
    ///
    /// Fails when encryption is requested and the secret is too short to
    /// derive a cipher key from, or when refresh is enabled without
    /// encryption.
    pub fn new(config: &CookieConfig) -> Result<Self> {
        if config.refresh_enabled() && !config.encrypt {
            return Err(SessionError::RefreshWithoutEncryption);
        }

        let cipher = if config.encrypt {
            Some(derive_cipher(config.secret.as_bytes())?)
        } else {
            None
        };

        Ok(Self {
            name: config.name.clone(),
            signing_key: hmac::Key::new(hmac::HMAC_SHA256, config.secret.as_bytes()),
            cipher,
            max_age: to_delta(config.expire),
        })
    }

    /// Whether payloads are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encode a session stamped with `now`.
    pub fn encode(&self, session: &Session, now: DateTime<Utc>) -> Result<String> {
        let json = serde_json::to_vec(session)?;
        let payload = match &self.cipher {
            Some(key) => self.seal(key, json)?,
            None => json,
        };

        let payload = URL_SAFE_NO_PAD.encode(payload);
        let timestamp = now.timestamp().to_string();
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload, &timestamp).as_ref());

        Ok(format!("{payload}|{timestamp}|{signature}"))
    }

    /// Verify and decode a cookie value at `now`.
    pub fn decode(&self, value: &str, now: DateTime<Utc>) -> Result<Decoded> {
        let mut parts = value.split('|');
        let (Some(payload), Some(timestamp), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::InvalidFormat(
                "expected payload|timestamp|signature".to_string(),
            ));
        };

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::BadSignature)?;
        let expected = self.sign(payload, timestamp);
        if !bool::from(provided.as_slice().ct_eq(expected.as_ref())) {
            return Err(SessionError::BadSignature);
        }

        let issued_at = timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| SessionError::InvalidFormat("bad timestamp".to_string()))?;
        if !self.within_window(issued_at, now) {
            return Err(SessionError::Expired);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| SessionError::InvalidFormat(e.to_string()))?;
        let json = match &self.cipher {
            Some(key) => open(key, &self.name, raw)?,
            None => raw,
        };

        let session: Session = serde_json::from_slice(&json)?;
        if !session.is_valid() {
            return Err(SessionError::Payload("session names no identity".to_string()));
        }

        Ok(Decoded { session, issued_at })
    }

    fn sign(&self, payload: &str, timestamp: &str) -> hmac::Tag {
        let mut ctx = hmac::Context::with_key(&self.signing_key);
        ctx.update(self.name.as_bytes());
        ctx.update(b"|");
        ctx.update(payload.as_bytes());
        ctx.update(b"|");
        ctx.update(timestamp.as_bytes());
        ctx.sign()
    }

    fn within_window(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let oldest = now.checked_sub_signed(self.max_age);
        let newest = now.checked_add_signed(TimeDelta::seconds(MAX_CLOCK_SKEW_SECS));
        oldest.is_none_or(|oldest| issued_at > oldest)
            && newest.is_none_or(|newest| issued_at <= newest)
    }

    fn seal(&self, key: &LessSafeKey, plaintext: Vec<u8>) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext;
        key.seal_in_place_append_tag(nonce, Aad::from(self.name.as_bytes()), &mut in_out)
            .map_err(|_| SessionError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }
}

fn open(key: &LessSafeKey, name: &str, mut data: Vec<u8>) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(SessionError::Decrypt);
    }
    let nonce =
        Nonce::try_assume_unique_for_key(&data[..NONCE_LEN]).map_err(|_| SessionError::Decrypt)?;

    let plaintext_len = key
        .open_in_place(nonce, Aad::from(name.as_bytes()), &mut data[NONCE_LEN..])
        .map_err(|_| SessionError::Decrypt)?
        .len();

    data.copy_within(NONCE_LEN..NONCE_LEN + plaintext_len, 0);
    data.truncate(plaintext_len);
    Ok(data)
}

struct KeyLen(usize);

impl hkdf::KeyType for KeyLen {
    fn len(&self) -> usize {
        self.0
    }
}

fn derive_cipher(secret: &[u8]) -> Result<LessSafeKey> {
    if secret.len() < MIN_CIPHER_SECRET_LEN {
        return Err(SessionError::InvalidKey(format!(
            "encryption needs a secret of at least {MIN_CIPHER_SECRET_LEN} bytes, got {}",
            secret.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT)
        .extract(secret)
        .expand(&[HKDF_INFO], KeyLen(key_bytes.len()))
        .and_then(|okm| okm.fill(&mut key_bytes))
        .map_err(|_| SessionError::InvalidKey("key derivation failed".to_string()))?;

    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
        .map_err(|_| SessionError::InvalidKey("cipher rejected derived key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}
