//! Session token material and the closed refresh error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Outcome class of a failed refresh attempt.
///
/// This is the only representation of refresh errors once classified; the
/// gate, the coordinator and client-facing responses all speak in these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Refresh attempted but the session carries no refresh token.
    NoRefreshToken,
    /// Upstream failed for a transient reason (network, 5xx, timeout, bad body).
    RefreshAccessTokenError,
    /// Upstream rejected the refresh token as expired or invalid.
    RefreshTokenExpired,
    /// Upstream invalidated the whole token family.
    TokenFamilyInvalidated,
    /// Upstream saw the same refresh token presented twice.
    ReuseDetected,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::NoRefreshToken,
        ErrorKind::RefreshAccessTokenError,
        ErrorKind::RefreshTokenExpired,
        ErrorKind::TokenFamilyInvalidated,
        ErrorKind::ReuseDetected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoRefreshToken => "NoRefreshToken",
            Self::RefreshAccessTokenError => "RefreshAccessTokenError",
            Self::RefreshTokenExpired => "RefreshTokenExpired",
            Self::TokenFamilyInvalidated => "TokenFamilyInvalidated",
            Self::ReuseDetected => "ReuseDetected",
        }
    }

    /// Recoverable errors leave the session usable until its access token expires.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::NoRefreshToken | Self::RefreshAccessTokenError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Token pair returned by the upstream on login, registration or refresh.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the upstream does not rotate refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Short-lived bearer credential. The expiry travels with the value so the two
/// can only ever be cleared together.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    /// Unix epoch milliseconds.
    pub expires_at: i64,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token state of one authenticated principal.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    /// `None` only after a fail-closed wipe.
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<String>,
    pub error_state: Option<ErrorKind>,
    /// Unix epoch milliseconds of the most recent refresh attempt, any outcome.
    pub last_refresh_attempt_at: Option<i64>,
    /// Expiry of the signed session artifact (Unix epoch milliseconds).
    pub expires_at: i64,
}

impl Session {
    /// Build a fresh session from an issued token pair.
    pub fn issue(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        tokens: TokenResponse,
        now: i64,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            access_token: Some(AccessToken {
                value: tokens.access_token,
                expires_at: now + secs_to_millis(tokens.expires_in),
            }),
            refresh_token: tokens.refresh_token,
            error_state: None,
            last_refresh_attempt_at: None,
            expires_at: now + ttl.as_millis() as i64,
        }
    }

    pub fn access_token_expires_at(&self) -> Option<i64> {
        self.access_token.as_ref().map(|t| t.expires_at)
    }

    /// Milliseconds until the access token expires; negative once expired.
    pub fn time_until_expiry(&self, now: i64) -> Option<i64> {
        self.access_token_expires_at().map(|exp| exp - now)
    }

    /// True when the error state forbids treating this session as authenticated.
    pub fn is_terminal(&self) -> bool {
        self.error_state.is_some_and(|kind| !kind.is_recoverable())
    }

    /// Usable for authorization: not terminal and the access token is live.
    pub fn is_valid(&self, now: i64) -> bool {
        !self.is_terminal() && self.time_until_expiry(now).is_some_and(|left| left > 0)
    }

    /// Replace the token pair after a successful refresh.
    pub fn apply_refresh(&mut self, tokens: TokenResponse, now: i64) {
        self.access_token = Some(AccessToken {
            value: tokens.access_token,
            expires_at: now + secs_to_millis(tokens.expires_in),
        });
        if let Some(refresh_token) = tokens.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.error_state = None;
    }

    /// Record a classified failure. Unrecoverable kinds wipe both tokens.
    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.error_state = Some(kind);
        if !kind.is_recoverable() {
            self.clear_tokens();
        }
    }

    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("error_state", &self.error_state)
            .field("last_refresh_attempt_at", &self.last_refresh_attempt_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
