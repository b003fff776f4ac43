//! Session types: the server's record of a user's connections.

use tokio::time::Instant;

use crate::UserContext;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long (in seconds) a fully disconnected user's session is kept
    /// before [`SessionManager::expire_stale`](crate::SessionManager::expire_stale)
    /// drops it.
    ///
    /// Default: 300 seconds, matching the host reconnection window.
    pub reconnect_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
///   Connected{n} ──(last socket closes)──→ Disconnected ──(grace)──→ Expired
///        ↑                                     │
///        └──────────────(connect)──────────────┘
/// ```
///
/// A user may hold several sockets at once (two tabs, phone and desktop);
/// `connections` counts them and the session is only disconnected when
/// the last one closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected { connections: u32 },
    /// Uses Tokio's clock so paused-time tests can step through the grace
    /// period.
    Disconnected { since: Instant },
    Expired,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One user's session on the server.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserContext,
    pub state: SessionState,
}
