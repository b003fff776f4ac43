//! Authentication hook and the user context it produces.
//!
//! Token issuance lives outside the hall (JWT, OAuth bridge, bot login).
//! The server only needs something that can answer "who does this token
//! belong to?", which is what [`Authenticator`] captures.

use bingohall_protocol::UserId;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Role name that unlocks the admin commands (failure report, forced
/// refunds).
pub const ADMIN_ROLE: &str = "admin";

/// An authenticated user, as supplied by the auth layer.
///
/// `experience` drives room limits and auto-call eligibility; the engine
/// never modifies it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: UserId,
    pub username: String,
    pub experience: u32,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserContext {
    pub fn new(id: UserId, username: impl Into<String>, experience: u32) -> Self {
        Self {
            id,
            username: username.into(),
            experience,
            roles: Vec::new(),
        }
    }

    /// Adds a role, builder style.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// Validates a client's auth token and returns who they are.
///
/// # Example
///
/// ```rust
/// use bingohall_protocol::UserId;
/// use bingohall_session::{Authenticator, SessionError, UserContext};
///
/// /// Accepts `"<id>:<name>"` tokens. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserContext, SessionError> {
///         let (id, name) = token
///             .split_once(':')
///             .ok_or_else(|| SessionError::AuthFailed("expected id:name".into()))?;
///         let id: u64 = id
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("id must be a number".into()))?;
///         Ok(UserContext::new(UserId(id), name, 0))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Called once per connection, during the handshake.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<UserContext, SessionError>> + Send;
}
