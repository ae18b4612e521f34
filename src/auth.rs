//! Authorization gate for mutating operations.
//!
//! Two credentials are accepted: a static API key (header `x-api-key`,
//! constant-time comparison) or an admin session cookie (`admin_session`,
//! random token with a TTL, held in memory). The rest of the crate only ever
//! asks for the boolean decision.

use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::RwLock;

/// Name of the cookie carrying the admin session token.
pub const SESSION_COOKIE: &str = "admin_session";

/// Validates a provided secret against the expected one using constant-time
/// comparison, preventing timing attacks.
///
/// Returns `false` if either side is empty.
pub fn validate_secret(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    // Empty secrets are never valid
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    // Length mismatch - still compare to maintain constant time
    let len_match = provided.len() == expected.len();

    // XOR accumulator: if any byte differs, result will be non-zero
    let mut diff: u8 = 0;
    for (a, b) in provided.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    len_match && diff == 0
}

/// Extracts the admin session token from a `Cookie` header value.
///
/// Returns `None` if no `admin_session` cookie is present or it is empty.
pub fn extract_session_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name.trim() == SESSION_COOKIE {
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        } else {
            None
        }
    })
}

/// In-memory store of active admin sessions.
///
/// Tokens expire after a TTL; expired tokens are purged lazily on each
/// validation. Sessions do not survive a daemon restart.
pub struct SessionStore {
    tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Mint a new session token and register it.
    pub fn create(&self) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        self.tokens
            .write()
            .unwrap()
            .insert(token.clone(), Utc::now() + self.ttl);

        token
    }

    /// Check whether a token names a live session.
    pub fn validate(&self, token: &str) -> bool {
        let now = Utc::now();

        {
            let tokens = self.tokens.read().unwrap();
            match tokens.get(token) {
                Some(expires) if *expires > now => return true,
                None => return false,
                Some(_) => {}
            }
        }

        // token exists but expired
        self.tokens.write().unwrap().remove(token);
        false
    }

    pub fn destroy(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }

    /// Drop every expired session. Called opportunistically from sign-in.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.tokens
            .write()
            .unwrap()
            .retain(|_, expires| *expires > now);
    }
}
