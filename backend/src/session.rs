//! Admin sessions. Bearer tokens are random, short lived and only their
//! SHA-256 is kept in memory.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::integrity::sha256_hex;

const TOKEN_BYTES: usize = 32;

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session and returns the bearer token with its expiry.
    pub fn issue(&self, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.with_sessions(|sessions| {
            sessions.insert(sha256_hex(token.as_bytes()), expires_at);
        });
        (token, expires_at)
    }

    /// True while the token is known and unexpired. Expired tokens are dropped.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> bool {
        let key = sha256_hex(token.as_bytes());
        self.with_sessions(|sessions| match sessions.get(&key).copied() {
            Some(expires_at) if expires_at > now => true,
            Some(_) => {
                sessions.remove(&key);
                false
            }
            None => false,
        })
    }

    pub fn revoke(&self, token: &str) -> bool {
        let key = sha256_hex(token.as_bytes());
        self.with_sessions(|sessions| sessions.remove(&key).is_some())
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.with_sessions(|sessions| {
            let before = sessions.len();
            sessions.retain(|_, expires_at| *expires_at > now);
            before - sessions.len()
        })
    }

    pub fn len(&self) -> usize {
        self.with_sessions(|sessions| sessions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_sessions<R>(&self, f: impl FnOnce(&mut HashMap<String, DateTime<Utc>>) -> R) -> R {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut sessions)
    }
}
