use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: i64,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
}

fn gen_token() -> String {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Issues and validates session tokens. Constructed once at startup and
/// shared by handle; no process-global session table exists.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    user_index: Arc<RwLock<HashMap<i64, HashSet<String>>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(60 * 60))
    }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            user_index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn issue(&self, user_id: i64) -> Session {
        let now = Instant::now();
        let token = gen_token();
        let sess = Session {
            token: token.clone(),
            user_id,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        {
            let mut m = self.sessions.write();
            m.insert(token.clone(), SessionEntry { session: sess.clone() });
        }
        {
            let mut uidx = self.user_index.write();
            uidx.entry(user_id).or_insert_with(HashSet::new).insert(token);
        }
        tprintln!("session.issue user_id={} ttl_secs={}", user_id, self.ttl.as_secs());
        sess
    }

    /// Returns the owning user id for a live token, pruning it if expired.
    pub fn validate(&self, token: &str) -> Option<i64> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(ent) = map.get(token) {
                if ent.session.expires_at > now {
                    Some(ent.session.user_id)
                } else {
                    drop_key = Some(token.to_string());
                    None
                }
            } else {
                None
            }
        };
        if let Some(k) = drop_key {
            self.sessions.write().remove(&k);
        }
        out
    }

    /// Drop a session. Idempotent: an unknown or already-dropped token
    /// returns false without error.
    pub fn logout(&self, token: &str) -> bool {
        let mut removed = false;
        if let Some(ent) = self.sessions.write().remove(token) {
            removed = true;
            let uid = ent.session.user_id;
            let mut idx = self.user_index.write();
            if let Some(set) = idx.get_mut(&uid) {
                set.remove(token);
            }
        }
        removed
    }

    /// Drop every live session for a user. Not wired to any procedure in
    /// scope; deactivation takes effect through re-resolution instead.
    pub fn revoke_user(&self, user_id: i64) -> usize {
        let mut count = 0usize;
        if let Some(tokens) = self.user_index.read().get(&user_id).cloned() {
            let mut s = self.sessions.write();
            for t in tokens.iter() {
                if s.remove(t).is_some() {
                    count += 1;
                }
            }
        }
        self.user_index.write().remove(&user_id);
        tprintln!("session.revoke user_id={} count={}", user_id, count);
        count
    }
}
