//! Single-flight refresh of session tokens.
//!
//! Every session id gets a dedup handle: an async mutex guarding the last
//! settled outcome and when it settled. A caller takes the lock; if the last
//! attempt settled within [`REFRESH_COOLDOWN`] it gets that outcome back,
//! otherwise it performs the upstream call itself. Callers that arrive while an
//! attempt is in flight queue on the lock and then find the fresh outcome, so
//! they never reach the upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::classifier::{RefreshFailure, classify};
use super::store::TokenStore;
use super::types::{ErrorKind, Session, now_millis};
use super::upstream::AuthUpstream;

/// Window during which a settled refresh outcome is shared instead of repeated.
pub const REFRESH_COOLDOWN: Duration = Duration::from_millis(2000);

/// Result shared with every caller of one refresh cycle.
pub type RefreshResult = Result<Session, RefreshError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("session not found")]
    SessionNotFound,
    #[error("refresh failed: {0}")]
    Failed(ErrorKind),
}

impl RefreshError {
    /// The classified kind, if the attempt reached classification.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::SessionNotFound => None,
            Self::Failed(kind) => Some(*kind),
        }
    }

    /// True when the session is gone or terminally invalid.
    pub fn is_terminal(&self) -> bool {
        self.kind().is_none_or(|kind| !kind.is_recoverable())
    }
}

struct Settled {
    result: RefreshResult,
    at: Instant,
}

#[derive(Default)]
struct DedupHandle {
    last: tokio::sync::Mutex<Option<Settled>>,
}

/// Deduplicates concurrent refreshes per session and applies their outcome.
pub struct RefreshCoordinator {
    store: Arc<dyn TokenStore>,
    upstream: Arc<dyn AuthUpstream>,
    handles: Mutex<HashMap<String, Arc<DedupHandle>>>,
    cooldown: Duration,
    timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn TokenStore>, upstream: Arc<dyn AuthUpstream>) -> Self {
        Self {
            store,
            upstream,
            handles: Mutex::new(HashMap::new()),
            cooldown: REFRESH_COOLDOWN,
            timeout: REFRESH_COOLDOWN,
        }
    }

    /// Upstream call timeout. Clamped to the cooldown so a hung upstream cannot
    /// hold the dedup handle past one window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(self.cooldown);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Refresh the tokens of `session_id`, joining any attempt in flight or
    /// settled within the cooldown.
    ///
    /// The refresh token used is the one currently held in the [`TokenStore`].
    pub async fn refresh(&self, session_id: &str) -> RefreshResult {
        let handle = self.handle(session_id);
        let mut last = handle.last.lock().await;

        if let Some(settled) = last.as_ref() {
            if settled.at.elapsed() < self.cooldown {
                debug!(session_id = %session_id, "Joining recent refresh outcome");
                return settled.result.clone();
            }
        }

        let result = self.attempt(session_id).await;
        *last = Some(Settled {
            result: result.clone(),
            at: Instant::now(),
        });
        result
    }

    /// Drop dedup handles that are idle and settled longer than the cooldown ago.
    pub fn prune_idle(&self) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        let before = handles.len();
        let cooldown = self.cooldown;
        handles.retain(|_, handle| {
            // Held elsewhere or locked: a caller is queued or in flight.
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.last.try_lock() {
                Ok(last) => last.as_ref().is_some_and(|s| s.at.elapsed() < cooldown),
                Err(_) => true,
            }
        });
        before - handles.len()
    }

    /// Drop the dedup handle of a removed session so no settled outcome
    /// outlives it. An attempt still in flight finds the record gone.
    pub fn forget(&self, session_id: &str) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.remove(session_id);
    }

    pub fn handle_count(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or_default()
    }

    fn handle(&self, session_id: &str) -> Arc<DedupHandle> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.entry(session_id.to_string()).or_default().clone()
    }

    async fn attempt(&self, session_id: &str) -> RefreshResult {
        let mut session = self
            .store
            .read(session_id)
            .ok_or(RefreshError::SessionNotFound)?;

        if let Some(kind) = session.error_state.filter(|k| !k.is_recoverable()) {
            // Terminal sessions are never retried.
            return Err(RefreshError::Failed(kind));
        }

        session.last_refresh_attempt_at = Some(now_millis());

        let outcome = match session.refresh_token.as_deref() {
            None => Err(RefreshFailure::MissingRefreshToken),
            Some(refresh_token) => {
                match tokio::time::timeout(self.timeout, self.upstream.refresh(refresh_token)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RefreshFailure::Timeout),
                }
            }
        };

        match outcome {
            Ok(tokens) => {
                session.apply_refresh(tokens, now_millis());
                if !self.store.replace_if_present(session_id, session.clone()) {
                    debug!(session_id = %session_id, "Session removed during refresh");
                    return Err(RefreshError::SessionNotFound);
                }
                info!(
                    session_id = %session_id,
                    expires_at = session.access_token_expires_at().unwrap_or_default(),
                    "Session tokens refreshed"
                );
                Ok(session)
            }
            Err(failure) => {
                let kind = classify(&failure);
                session.record_failure(kind);
                if kind.is_recoverable() {
                    warn!(
                        session_id = %session_id,
                        kind = %kind,
                        error = %failure,
                        "Refresh failed"
                    );
                } else {
                    error!(
                        session_id = %session_id,
                        kind = %kind,
                        error = %failure,
                        "Refresh failed, session invalidated"
                    );
                }
                if !self.store.replace_if_present(session_id, session) {
                    debug!(session_id = %session_id, "Session removed during refresh");
                    return Err(RefreshError::SessionNotFound);
                }
                Err(RefreshError::Failed(kind))
            }
        }
    }
}
