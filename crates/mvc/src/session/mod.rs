//! In-memory session store with sliding expiry.
//!
//! Sessions live in a sharded [`DashMap`] keyed by an opaque random token. Every
//! session is one map entry holding both its values and its timestamps, so a
//! single shard lock covers a whole read-modify-write. Expired sessions behave as
//! absent for every operation and are physically removed by
//! [`SessionStore::sweep_expired`], usually driven by [`SessionStore::spawn_sweeper`].

pub mod cookie;

use crate::value::Value;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Sessions expire after 30 minutes without a refresh.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    values: HashMap<String, Value>,
    created_at: Instant,
    last_accessed: Instant,
    expires_at: Instant,
}

impl Session {
    fn new(now: Instant, timeout: Duration) -> Self {
        Self { values: HashMap::new(), created_at: now, last_accessed: now, expires_at: now + timeout }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    fn touch(&mut self, now: Instant, timeout: Duration) {
        self.last_accessed = now;
        self.expires_at = now + timeout;
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// Concurrent session store. Clones share the same sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self { sessions: Arc::new(DashMap::new()), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resolves the session for a request.
    ///
    /// A known and unexpired token is refreshed and returned with `false`. Anything
    /// else creates a fresh session under a new token, returned with `true` so the
    /// caller can send the cookie.
    pub fn get_or_create(&self, token: Option<&str>) -> (String, bool) {
        let now = Instant::now();

        if let Some(token) = token {
            {
                if let Some(mut session) = self.sessions.get_mut(token)
                    && !session.is_expired(now)
                {
                    session.touch(now, self.timeout);
                    trace!(session = token, "refreshed session");
                    return (token.to_owned(), false);
                }
            }
            self.sessions.remove_if(token, |_, session| session.is_expired(now));
        }

        loop {
            match self.sessions.entry(new_token()) {
                Entry::Vacant(vacant) => {
                    let id = vacant.key().clone();
                    vacant.insert(Session::new(now, self.timeout));
                    debug!(session = %id, "created session");
                    return (id, true);
                }
                Entry::Occupied(_) => continue,
            }
        }
    }

    pub fn get(&self, id: &str, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.sessions
            .get(id)
            .filter(|session| !session.is_expired(now))
            .and_then(|session| session.values.get(key).cloned())
    }

    /// Stores a value and refreshes the expiry. Returns false, storing nothing, if
    /// the session is missing or expired.
    pub fn set(&self, id: &str, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let now = Instant::now();
        match self.sessions.get_mut(id) {
            Some(mut session) if !session.is_expired(now) => {
                session.values.insert(key.into(), value.into());
                session.touch(now, self.timeout);
                true
            }
            _ => false,
        }
    }

    /// Removes a value without refreshing the expiry.
    pub fn remove(&self, id: &str, key: &str) -> Option<Value> {
        let now = Instant::now();
        match self.sessions.get_mut(id) {
            Some(mut session) if !session.is_expired(now) => session.values.remove(key),
            _ => None,
        }
    }

    pub fn destroy(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session = id, "destroyed session");
        }
        removed
    }

    pub fn exists(&self, id: &str) -> bool {
        let now = Instant::now();
        self.sessions.get(id).is_some_and(|session| !session.is_expired(now))
    }

    /// Snapshot of every value of a live session.
    pub fn values(&self, id: &str) -> Option<HashMap<String, Value>> {
        let now = Instant::now();
        self.sessions.get(id).filter(|session| !session.is_expired(now)).map(|session| session.values.clone())
    }

    /// Removes all expired sessions and returns how many were removed.
    ///
    /// Each entry is checked under its own shard lock, so a session refreshed
    /// concurrently is never dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let expired = session.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `period` on the current
    /// tokio runtime until the returned handle is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "swept expired sessions");
                }
            }
        })
    }

    /// A handle bound to one session id.
    pub fn handle(&self, id: impl Into<String>) -> SessionHandle {
        SessionHandle { store: self.clone(), id: id.into() }
    }
}

/// Access to the session of the current request.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    store: SessionStore,
    id: String,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.id, key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        self.store.set(&self.id, key, value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.store.remove(&self.id, key)
    }

    pub fn values(&self) -> HashMap<String, Value> {
        self.store.values(&self.id).unwrap_or_default()
    }

    pub fn is_valid(&self) -> bool {
        self.store.exists(&self.id)
    }

    /// Destroys the session. Later reads through any handle see nothing.
    pub fn invalidate(&self) {
        self.store.destroy(&self.id);
    }
}

/// 128 random bits, hex encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
