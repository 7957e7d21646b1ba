//! The token backend: refresh endpoint and the opaque login/register issuer.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use super::classifier::RefreshFailure;
use super::types::TokenResponse;

/// Default limit on one backend request, connect to last body byte.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Which issuance endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Login,
    Register,
}

impl IssueKind {
    fn path(self) -> &'static str {
        match self {
            Self::Login => "auth/login",
            Self::Register => "auth/register",
        }
    }
}

/// Initial token pair for a newly authenticated principal.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedSession {
    pub user_id: String,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

/// Failure of a login/register call.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream rejected request with status {status}")]
    Rejected { status: u16, detail: Option<String> },
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// Token backend consumed by the session core.
pub trait AuthUpstream: Send + Sync + 'static {
    /// `POST /auth/refresh` with `{refresh_token}`.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, RefreshFailure>>;

    /// Forward credentials to `POST /auth/login` or `POST /auth/register`.
    fn issue<'a>(
        &'a self,
        kind: IssueKind,
        credentials: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<IssuedSession, UpstreamError>>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// [`AuthUpstream`] over HTTP.
pub struct HttpAuthUpstream {
    base: Url,
    http: reqwest::Client,
}

impl HttpAuthUpstream {
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            base,
            http: http_client(UPSTREAM_TIMEOUT),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    async fn post_refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshFailure> {
        let url = self
            .endpoint("auth/refresh")
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RefreshFailure::Timeout
                } else {
                    RefreshFailure::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_detail(response).await;
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshFailure::MalformedBody(e.without_url().to_string()))?;

        if tokens.access_token.is_empty() || tokens.expires_in == 0 {
            return Err(RefreshFailure::MalformedBody(
                "empty access token or zero lifetime".into(),
            ));
        }

        Ok(tokens)
    }

    async fn post_issue(
        &self,
        kind: IssueKind,
        credentials: &serde_json::Value,
    ) -> Result<IssuedSession, UpstreamError> {
        let url = self
            .endpoint(kind.path())
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_detail(response).await;
            return Err(UpstreamError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<IssuedSession>()
            .await
            .map_err(|e| UpstreamError::Malformed(e.without_url().to_string()))
    }
}

impl AuthUpstream for HttpAuthUpstream {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, RefreshFailure>> {
        Box::pin(self.post_refresh(refresh_token))
    }

    fn issue<'a>(
        &'a self,
        kind: IssueKind,
        credentials: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<IssuedSession, UpstreamError>> {
        Box::pin(self.post_issue(kind, credentials))
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Pull the optional `detail` message out of an error body.
async fn read_detail(response: reqwest::Response) -> Option<String> {
    let body = response.text().await.ok()?;
    let parsed: ErrorBody = serde_json::from_str(&body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let upstream = HttpAuthUpstream::new("http://backend:8000/api".parse().unwrap());
        assert_eq!(upstream.base_url().as_str(), "http://backend:8000/api/");
        assert_eq!(
            upstream.endpoint("auth/refresh").unwrap().as_str(),
            "http://backend:8000/api/auth/refresh"
        );
    }

    #[test]
    fn test_endpoint_on_bare_host() {
        let upstream = HttpAuthUpstream::new("http://backend:8000".parse().unwrap());
        assert_eq!(
            upstream.endpoint(IssueKind::Register.path()).unwrap().as_str(),
            "http://backend:8000/auth/register"
        );
    }

    #[test]
    fn test_issued_session_parses_flattened_tokens() {
        let issued: IssuedSession = serde_json::from_str(
            r#"{"user_id":"u1","access_token":"a","refresh_token":"r","expires_in":900}"#,
        )
        .unwrap();
        assert_eq!(issued.user_id, "u1");
        assert_eq!(issued.tokens.access_token, "a");
        assert_eq!(issued.tokens.refresh_token.as_deref(), Some("r"));
        assert_eq!(issued.tokens.expires_in, 900);
    }
}
