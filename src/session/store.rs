use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Payload kept server-side for one browser session
pub type SessionData = HashMap<String, String>;

/// Length in bytes of the random part of a session id (hex encoded to 32 chars)
const SESSION_ID_BYTES: usize = 16;

struct Session {
    data: SessionData,
    created_at: Instant,
    last_accessed: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed) > timeout
    }
}

/// Thread-safe in-memory session store with sliding expiry.
///
/// Session ids go to the browser; the payload (credentials) never leaves the
/// server. Expired sessions are dropped lazily when looked up and in bulk by
/// [`SessionStore::sweep`]. All state sits behind one mutex, held only for
/// in-memory work.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store `data` under a fresh session id and return the id
    pub fn create(&self, data: SessionData) -> String {
        let mut sessions = self.sessions.lock();
        let id = loop {
            let id = generate_session_id();
            if !sessions.contains_key(&id) {
                break id;
            }
        };
        let now = Instant::now();
        sessions.insert(
            id.clone(),
            Session {
                data,
                created_at: now,
                last_accessed: now,
            },
        );
        debug!("Created session: {}...", short_id(&id));
        id
    }

    /// Copy of the session payload, refreshing its idle timer.
    ///
    /// Unknown and expired ids both yield `None`; an expired entry is removed.
    pub fn get(&self, id: &str) -> Option<SessionData> {
        if id.is_empty() {
            return None;
        }

        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        if session.is_expired(now, self.timeout) {
            sessions.remove(id);
            debug!("Session expired: {}...", short_id(id));
            return None;
        }
        session.last_accessed = now;
        Some(session.data.clone())
    }

    /// Replace the payload of a live session. Returns false if the id is unknown or expired.
    pub fn update(&self, id: &str, data: SessionData) -> bool {
        if id.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };
        if session.is_expired(now, self.timeout) {
            sessions.remove(id);
            debug!("Session expired: {}...", short_id(id));
            return false;
        }
        session.data = data;
        session.last_accessed = now;
        true
    }

    /// Remove a session. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }

        match self.sessions.lock().remove(id) {
            Some(session) => {
                debug!(
                    "Deleted session: {}... (age {:?})",
                    short_id(id),
                    session.created_at.elapsed()
                );
                true
            }
            None => false,
        }
    }

    /// Remove every expired session; returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Cleaned up {} expired sessions", removed);
        }
        removed
    }

    /// Number of live sessions; expired ones are swept first
    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| !session.is_expired(now, self.timeout));
        sessions.len()
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Prefix of a session id that is safe to put in logs
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
