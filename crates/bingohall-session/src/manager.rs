//! The session manager: who is connected right now.
//!
//! The gateway consults this before acting on a disconnect. A host who
//! closed one tab but still has another open is not "gone", and a host
//! who reconnected inside the grace window must not have their room
//! cancelled.
//!
//! `SessionManager` is a plain `HashMap` and not thread-safe by itself;
//! the server keeps it behind its shared-state mutex.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use bingohall_protocol::UserId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState, UserContext};

/// Tracks every connected (or recently disconnected) user.
pub struct SessionManager {
    sessions: HashMap<UserId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Registers a new socket for `user`.
    ///
    /// A user who is already connected gets their connection count bumped;
    /// a disconnected or expired session is revived. The stored context is
    /// refreshed either way so XP and roles follow the latest token.
    pub fn connect(&mut self, user: UserContext) -> &Session {
        let user_id = user.id;
        let session = match self.sessions.entry(user_id) {
            Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session.state = match session.state {
                    SessionState::Connected { connections } => SessionState::Connected {
                        connections: connections + 1,
                    },
                    _ => SessionState::Connected { connections: 1 },
                };
                session.user = user;
                session
            }
            Entry::Vacant(entry) => entry.insert(Session {
                user,
                state: SessionState::Connected { connections: 1 },
            }),
        };
        tracing::info!(%user_id, state = ?session.state, "session connected");
        session
    }

    /// Drops one socket for `user_id`.
    ///
    /// Returns `true` when that was the user's last connection, meaning
    /// they are now fully disconnected and their grace period has started.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the user has no session.
    pub fn disconnect(&mut self, user_id: UserId) -> Result<bool, SessionError> {
        let session = self
            .sessions
            .get_mut(&user_id)
            .ok_or(SessionError::NotFound(user_id))?;

        match session.state {
            SessionState::Connected { connections } if connections > 1 => {
                session.state = SessionState::Connected {
                    connections: connections - 1,
                };
                tracing::debug!(%user_id, remaining = connections - 1, "socket closed");
                Ok(false)
            }
            SessionState::Connected { .. } => {
                session.state = SessionState::Disconnected {
                    since: Instant::now(),
                };
                tracing::info!(%user_id, "user disconnected, grace period started");
                Ok(true)
            }
            SessionState::Disconnected { .. } | SessionState::Expired => Ok(false),
        }
    }

    /// Returns `true` if `user_id` holds at least one open socket.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|s| s.state.is_connected())
    }

    /// Expires sessions whose grace period elapsed. Returns their users.
    pub fn expire_stale(&mut self) -> Vec<UserId> {
        let grace = Duration::from_secs(self.config.reconnect_grace_secs);
        let mut expired = Vec::new();

        for (user_id, session) in self.sessions.iter_mut() {
            let SessionState::Disconnected { since } = session.state else {
                continue;
            };
            if since.elapsed() >= grace {
                session.state = SessionState::Expired;
                expired.push(*user_id);
                tracing::info!(%user_id, "session expired (grace period elapsed)");
            }
        }

        expired
    }

    /// Removes expired sessions.
    pub fn cleanup_expired(&mut self) {
        self.sessions
            .retain(|_, s| !matches!(s.state, SessionState::Expired));
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    /// Number of users with at least one open socket.
    pub fn connected_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state.is_connected())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64) -> UserContext {
        UserContext::new(UserId(id), format!("user{id}"), 0)
    }

    fn manager(grace_secs: u64) -> SessionManager {
        SessionManager::new(SessionConfig {
            reconnect_grace_secs: grace_secs,
        })
    }

    // =====================================================================
    // connect()
    // =====================================================================

    #[test]
    fn test_connect_new_user_is_connected() {
        let mut mgr = manager(60);
        let session = mgr.connect(user(1));
        assert_eq!(session.state, SessionState::Connected { connections: 1 });
        assert!(mgr.is_connected(&UserId(1)));
        assert!(!mgr.is_connected(&UserId(2)));
    }

    #[test]
    fn test_connect_twice_counts_sockets() {
        let mut mgr = manager(60);
        mgr.connect(user(1));
        let session = mgr.connect(user(1));
        assert_eq!(session.state, SessionState::Connected { connections: 2 });
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_connect_refreshes_context() {
        let mut mgr = manager(60);
        mgr.connect(user(1));
        let mut richer = user(1);
        richer.experience = 900;
        mgr.connect(richer);
        assert_eq!(mgr.get(&UserId(1)).unwrap().user.experience, 900);
    }

    // =====================================================================
    // disconnect()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_last_socket_reports_gone() {
        let mut mgr = manager(60);
        mgr.connect(user(1));
        mgr.connect(user(1));

        assert!(!mgr.disconnect(UserId(1)).unwrap(), "one socket remains");
        assert!(mgr.is_connected(&UserId(1)));

        assert!(mgr.disconnect(UserId(1)).unwrap());
        assert!(!mgr.is_connected(&UserId(1)));
        assert!(matches!(
            mgr.get(&UserId(1)).unwrap().state,
            SessionState::Disconnected { .. }
        ));

        // A stray extra close is harmless.
        assert!(!mgr.disconnect(UserId(1)).unwrap());
    }

    #[test]
    fn test_disconnect_unknown_user_returns_not_found() {
        let mut mgr = manager(60);
        let result = mgr.disconnect(UserId(9));
        assert!(matches!(result, Err(SessionError::NotFound(u)) if u == UserId(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_inside_grace_revives_session() {
        let mut mgr = manager(60);
        mgr.connect(user(1));
        mgr.disconnect(UserId(1)).unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(mgr.expire_stale().is_empty());

        mgr.connect(user(1));
        assert!(mgr.is_connected(&UserId(1)));
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_grace_then_cleanup() {
        let mut mgr = manager(60);
        mgr.connect(user(1));
        mgr.connect(user(2));
        mgr.disconnect(UserId(1)).unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(mgr.expire_stale(), vec![UserId(1)]);
        assert_eq!(mgr.len(), 2);

        mgr.cleanup_expired();
        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.connected_count(), 1);
        assert!(mgr.get(&UserId(1)).is_none());
    }
}
