//! "Sign in with GitHub" via the OAuth web application flow.
//!
//! [`OAuthLogin::begin`] issues a one-time `state` and the authorize URL to
//! redirect to; [`OAuthLogin::complete`] consumes that state, trades the
//! callback `code` for a user access token and fetches the GitHub profile.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::OAuthSettings,
    github::{GitHubApi, OAuthCodeExchange, RemoteOutcome},
};

const AUTHORIZE_PATH: &str = "/login/oauth/authorize";
const SCOPES: &str = "read:user user:email";
const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_PENDING_STATES: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("unknown or expired OAuth state")]
    InvalidState,

    #[error("GitHub rejected the authorization code: {0}")]
    Rejected(String),

    #[error("GitHub request failed (status {status:?}): {body}")]
    Remote {
        status: Option<StatusCode>,
        body: String,
    },

    #[error("unexpected response from GitHub: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct OAuthLogin {
    settings: OAuthSettings,
    authorize_url: Url,
    api: Arc<dyn GitHubApi>,
    state_ttl: Duration,
    max_pending: usize,
    pending: Mutex<PendingStates>,
}

/// Issued states with their issue time and order.
#[derive(Default)]
struct PendingStates {
    issued: u64,
    states: HashMap<String, (u64, Instant)>,
}

impl OAuthLogin {
    pub fn new(
        settings: OAuthSettings,
        web_url: &str,
        api: Arc<dyn GitHubApi>,
    ) -> Result<Self, url::ParseError> {
        let authorize_url = Url::parse(&format!(
            "{}{}",
            web_url.trim_end_matches('/'),
            AUTHORIZE_PATH
        ))?;

        Ok(Self {
            settings,
            authorize_url,
            api,
            state_ttl: DEFAULT_STATE_TTL,
            max_pending: MAX_PENDING_STATES,
            pending: Mutex::new(PendingStates::default()),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url.to_string()
    }

    /// Starts a login and returns the URL to send the browser to.
    ///
    /// At most `max_pending` logins are outstanding; past that the oldest
    /// state is dropped.
    pub async fn begin(&self) -> String {
        let state = Uuid::new_v4().simple().to_string();

        let mut pending = self.pending.lock().await;
        let ttl = self.state_ttl;
        pending
            .states
            .retain(|_, (_, issued_at)| issued_at.elapsed() < ttl);
        while pending.states.len() >= self.max_pending.max(1) {
            let Some(oldest) = pending
                .states
                .iter()
                .min_by_key(|(_, (order, _))| *order)
                .map(|(state, _)| state.clone())
            else {
                break;
            };
            pending.states.remove(&oldest);
        }
        pending.issued += 1;
        let order = pending.issued;
        pending.states.insert(state.clone(), (order, Instant::now()));

        self.authorization_url(&state)
    }

    pub async fn complete(&self, code: &str, state: &str) -> Result<GitHubUser, OAuthError> {
        self.consume_state(state).await?;

        let exchange = OAuthCodeExchange {
            client_id: self.settings.client_id.clone(),
            client_secret: self.settings.client_secret.clone(),
            code: code.to_string(),
            redirect_uri: self.settings.redirect_uri.clone(),
        };
        let access_token = match self.api.exchange_oauth_code(&exchange).await {
            RemoteOutcome::Success { payload, .. } => {
                let response: TokenResponse = serde_json::from_value(payload)
                    .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
                if let Some(error) = response.error {
                    let message = response.error_description.unwrap_or(error);
                    warn!(%message, "GitHub rejected OAuth code");
                    return Err(OAuthError::Rejected(message));
                }
                response.access_token.ok_or_else(|| {
                    OAuthError::InvalidResponse("token response without access_token".into())
                })?
            }
            other => {
                let (status, body) = other.into_parts();
                error!(?status, %body, "OAuth code exchange failed");
                return Err(OAuthError::Remote { status, body });
            }
        };

        match self.api.get_authenticated_user(&access_token).await {
            RemoteOutcome::Success { payload, .. } => {
                let user: GitHubUser = serde_json::from_value(payload)
                    .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
                info!(login = %user.login, "GitHub user signed in");
                Ok(user)
            }
            other => {
                let (status, body) = other.into_parts();
                error!(?status, %body, "fetching GitHub user failed");
                Err(OAuthError::Remote { status, body })
            }
        }
    }

    async fn consume_state(&self, state: &str) -> Result<(), OAuthError> {
        let (_, issued_at) = self
            .pending
            .lock()
            .await
            .states
            .remove(state)
            .ok_or(OAuthError::InvalidState)?;
        if issued_at.elapsed() >= self.state_ttl {
            return Err(OAuthError::InvalidState);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::mock::MockGitHub;
    use serde_json::json;

    fn settings() -> OAuthSettings {
        OAuthSettings {
            client_id: "Iv1.client".into(),
            client_secret: "shh".into(),
            redirect_uri: "http://localhost:3000/github/callback".into(),
        }
    }

    fn login(mock: &Arc<MockGitHub>) -> OAuthLogin {
        OAuthLogin::new(settings(), "https://github.com", mock.clone()).unwrap()
    }

    fn state_of(url: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[test]
    fn authorization_url_carries_client_and_scopes() {
        let mock = Arc::new(MockGitHub::new());
        let url = Url::parse(&login(&mock).authorization_url("abc")).unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "Iv1.client");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/github/callback");
        assert_eq!(pairs["scope"], "read:user user:email");
        assert_eq!(pairs["state"], "abc");
    }

    #[tokio::test]
    async fn completes_login_with_issued_state() {
        let mock = Arc::new(MockGitHub::new());
        let login = login(&mock);

        let state = state_of(&login.begin().await);
        let user = login.complete("code-123", &state).await.unwrap();

        assert_eq!(user.login, "octocat");
        assert_eq!(user.email.as_deref(), Some("octocat@github.com"));
        let recorded = mock.recorded();
        assert_eq!(recorded[0].endpoint, "exchange_oauth_code");
        assert_eq!(recorded[0].credential, "code-123");
        assert_eq!(recorded[1].credential, "gho_mock_user_token");
    }

    #[tokio::test]
    async fn state_is_single_use() {
        let mock = Arc::new(MockGitHub::new());
        let login = login(&mock);

        let state = state_of(&login.begin().await);
        login.complete("code", &state).await.unwrap();

        assert!(matches!(
            login.complete("code", &state).await,
            Err(OAuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn unknown_state_makes_no_remote_calls() {
        let mock = Arc::new(MockGitHub::new());
        let login = login(&mock);
        login.begin().await;

        assert!(matches!(
            login.complete("code", "forged").await,
            Err(OAuthError::InvalidState)
        ));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn expired_state_is_rejected() {
        let mock = Arc::new(MockGitHub::new());
        let login = login(&mock).with_state_ttl(Duration::ZERO);

        let state = state_of(&login.begin().await);

        assert!(matches!(
            login.complete("code", &state).await,
            Err(OAuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn oldest_pending_state_is_evicted_past_cap() {
        let mock = Arc::new(MockGitHub::new());
        let login = login(&mock).with_max_pending(2);

        let first = state_of(&login.begin().await);
        let second = state_of(&login.begin().await);
        let third = state_of(&login.begin().await);

        assert_eq!(login.pending.lock().await.states.len(), 2);
        assert!(matches!(
            login.complete("code", &first).await,
            Err(OAuthError::InvalidState)
        ));
        login.complete("code", &second).await.unwrap();
        login.complete("code", &third).await.unwrap();
    }

    #[tokio::test]
    async fn error_payload_with_ok_status_is_rejected() {
        let mock = Arc::new(MockGitHub::new());
        mock.oauth.set(RemoteOutcome::Success {
            status: StatusCode::OK,
            payload: json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            }),
        });
        let login = login(&mock);

        let state = state_of(&login.begin().await);
        let err = login.complete("stale", &state).await.unwrap_err();

        assert!(
            matches!(err, OAuthError::Rejected(message) if message.contains("incorrect or expired"))
        );
        assert_eq!(mock.calls(), vec!["exchange_oauth_code"]);
    }

    #[tokio::test]
    async fn user_lookup_failure_is_remote_error() {
        let mock = Arc::new(MockGitHub::new());
        mock.user.push(RemoteOutcome::Denied {
            status: StatusCode::UNAUTHORIZED,
            body: "Bad credentials".into(),
        });
        let login = login(&mock);

        let state = state_of(&login.begin().await);

        assert!(matches!(
            login.complete("code", &state).await,
            Err(OAuthError::Remote {
                status: Some(StatusCode::UNAUTHORIZED),
                ..
            })
        ));
    }
}
