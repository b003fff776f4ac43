//! Player identity and connection tracking for Bingo Hall.
//!
//! The hall does not issue credentials. An external auth layer hands each
//! client a token; this crate turns that token into a [`UserContext`]
//! through the [`Authenticator`] trait and remembers who is currently
//! connected.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← asks "is the host still here?" before cancelling
//!     ↕
//! Session Layer (this crate)  ← identity, connection counts, grace periods
//!     ↕
//! Protocol Layer (below)  ← provides UserId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{ADMIN_ROLE, Authenticator, UserContext};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
