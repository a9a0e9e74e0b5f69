//! Credential primitives for employee authentication.
//!
//! Passwords are stored as argon2 PHC strings. Sessions use opaque random
//! keys persisted by the caller. Password-reset tokens are short-lived JWTs
//! signed with the server secret *and* the employee's current password hash,
//! so a token dies the moment the password changes.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a session key.
pub const SESSION_KEY_LEN: usize = 40;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("invalid reset link")]
    InvalidUid,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub secret: String,
    /// `None` means session keys never expire.
    pub session_ttl_minutes: Option<i64>,
    pub reset_ttl_minutes: i64,
}

impl AuthConfig {
    fn reset_encoding_key(&self, password_hash: &str) -> EncodingKey {
        EncodingKey::from_secret(self.reset_secret(password_hash).as_bytes())
    }

    fn reset_decoding_key(&self, password_hash: &str) -> DecodingKey {
        DecodingKey::from_secret(self.reset_secret(password_hash).as_bytes())
    }

    fn reset_secret(&self, password_hash: &str) -> String {
        format!("{}{}", self.secret, password_hash)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_minutes
            .filter(|minutes| *minutes > 0)
            .map(Duration::minutes)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthnError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthnError::Hash(err.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthnError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| AuthnError::MalformedHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Problems with a candidate password, empty when acceptable.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if len > MAX_PASSWORD_LEN {
        problems.push(format!(
            "Ensure this field has no more than {MAX_PASSWORD_LEN} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    problems
}

pub fn generate_session_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Pulls the key out of `Token <key>` or `Bearer <key>`.
pub fn session_key_from_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    if !(scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")) {
        return None;
    }
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

pub fn encode_uid(employee_id: i32) -> String {
    URL_SAFE_NO_PAD.encode(employee_id.to_string())
}

pub fn decode_uid(uid: &str) -> Result<i32, AuthnError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(uid.trim_end_matches('='))
        .map_err(|_| AuthnError::InvalidUid)?;
    String::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(AuthnError::InvalidUid)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: i32,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue_reset_token(
    employee_id: i32,
    password_hash: &str,
    config: &AuthConfig,
) -> Result<String, AuthnError> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::minutes(config.reset_ttl_minutes))
        .unwrap_or(now)
        .timestamp() as usize;
    let claims = ResetClaims {
        sub: employee_id,
        exp,
        iat: now.timestamp() as usize,
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &config.reset_encoding_key(password_hash),
    )?)
}

pub fn verify_reset_token(
    token: &str,
    employee_id: i32,
    password_hash: &str,
    config: &AuthConfig,
) -> Result<(), AuthnError> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let claims = jsonwebtoken::decode::<ResetClaims>(
        token,
        &config.reset_decoding_key(password_hash),
        &validation,
    )
    .map_err(|_| AuthnError::InvalidToken)?
    .claims;
    if claims.sub != employee_id {
        return Err(AuthnError::InvalidToken);
    }
    Ok(())
}
