//! Connection registry: identity to live session, unique key.

use crate::broker::session::{ConnId, Session};
use std::collections::HashMap;

/// At most one live session per identity. A newer admission displaces the
/// older session (last-writer-wins); the displaced session is handed back to
/// the caller for notice and teardown.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<String, Session>,
}

impl ConnectionRegistry {
    /// Insert a session, returning the displaced one if the identity was
    /// already connected.
    pub fn admit(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.identity.clone(), session)
    }

    pub fn lookup(&self, identity: &str) -> Option<&Session> {
        self.sessions.get(identity)
    }

    pub fn lookup_mut(&mut self, identity: &str) -> Option<&mut Session> {
        self.sessions.get_mut(identity)
    }

    /// Remove the identity's session. When `expected_conn` is given, the
    /// removal only applies if the registered session still carries that
    /// connection id; a stale teardown leaves the replacement untouched.
    pub fn evict(&mut self, identity: &str, expected_conn: Option<ConnId>) -> Option<Session> {
        match expected_conn {
            Some(conn_id) => {
                if self.sessions.get(identity)?.conn_id != conn_id {
                    return None;
                }
                self.sessions.remove(identity)
            }
            None => self.sessions.remove(identity),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }
}
