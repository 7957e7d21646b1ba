//! Maps raw refresh-attempt failures onto [`ErrorKind`].
//!
//! Classification looks only at what the upstream said (or that no call could
//! be made). It never consults clocks or local state, so two processes that see
//! the same upstream response always agree on the kind.

use thiserror::Error;

use super::types::ErrorKind;

/// Raw failure of a refresh attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// No refresh token on the session, so no upstream call was made.
    #[error("no refresh token present")]
    MissingRefreshToken,
    /// Upstream answered with a non-success status.
    #[error("upstream rejected refresh with status {status}")]
    Rejected { status: u16, detail: Option<String> },
    /// Upstream answered 2xx with a body we could not use.
    #[error("malformed refresh response: {0}")]
    MalformedBody(String),
    /// Network failure before a response arrived.
    #[error("refresh transport error: {0}")]
    Transport(String),
    /// No response within the refresh timeout.
    #[error("refresh timed out")]
    Timeout,
}

/// Classify a failed refresh attempt into exactly one [`ErrorKind`].
pub fn classify(failure: &RefreshFailure) -> ErrorKind {
    match failure {
        RefreshFailure::MissingRefreshToken => ErrorKind::NoRefreshToken,
        RefreshFailure::Rejected { status, detail } => {
            classify_rejection(*status, detail.as_deref())
        }
        RefreshFailure::MalformedBody(_)
        | RefreshFailure::Transport(_)
        | RefreshFailure::Timeout => ErrorKind::RefreshAccessTokenError,
    }
}

fn classify_rejection(status: u16, detail: Option<&str>) -> ErrorKind {
    if (400..500).contains(&status) {
        if let Some(kind) = detail.and_then(kind_from_detail) {
            return kind;
        }
    }

    match status {
        401 | 403 => ErrorKind::RefreshTokenExpired,
        _ => ErrorKind::RefreshAccessTokenError,
    }
}

/// Providers report reuse and family revocation in the `detail` message.
fn kind_from_detail(detail: &str) -> Option<ErrorKind> {
    let detail = detail.to_ascii_lowercase();
    if detail.contains("reuse") || detail.contains("replay") {
        Some(ErrorKind::ReuseDetected)
    } else if detail.contains("family") {
        Some(ErrorKind::TokenFamilyInvalidated)
    } else {
        None
    }
}
