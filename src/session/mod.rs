//! Session token lifecycle: token storage, refresh coordination and the
//! refresh error taxonomy.
//!
//! A session pairs a short-lived access token with an optional refresh token.
//! [`RefreshCoordinator`] is the only writer after login: it collapses
//! concurrent refreshes of one session into a single upstream call and records
//! the classified outcome in the [`TokenStore`].

mod classifier;
mod coordinator;
mod store;
mod types;
mod upstream;

pub use classifier::{RefreshFailure, classify};
pub use coordinator::{REFRESH_COOLDOWN, RefreshCoordinator, RefreshError, RefreshResult};
pub use store::{MemoryTokenStore, TokenStore};
pub use types::{AccessToken, ErrorKind, Session, TokenResponse, now_millis};
pub use upstream::{
    AuthUpstream, HttpAuthUpstream, IssueKind, IssuedSession, UPSTREAM_TIMEOUT, UpstreamError,
};
