use std::{fmt, sync::Arc};

use http::StatusCode;
use serde::Deserialize;
use tracing::{error, info};

use super::{GitHubApi, RemoteOutcome, SignedAssertion};

#[derive(Debug, thiserror::Error)]
#[error("installation token exchange failed (status {status:?}): {body}")]
pub struct TokenExchangeError {
    pub status: Option<StatusCode>,
    pub body: String,
}

/// Installation access token. Only ever held in memory for one provisioning
/// call.
#[derive(Clone, Deserialize)]
pub struct InstallationToken {
    token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl InstallationToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct TokenExchanger {
    api: Arc<dyn GitHubApi>,
}

impl TokenExchanger {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    /// Trades an App JWT for an installation token. Never retried: a failed
    /// exchange needs a freshly minted assertion.
    pub async fn exchange(
        &self,
        assertion: &SignedAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken, TokenExchangeError> {
        let outcome = self
            .api
            .create_installation_token(assertion.as_str(), installation_id)
            .await;

        match outcome {
            RemoteOutcome::Success {
                status: StatusCode::CREATED,
                payload,
            } => {
                let token: InstallationToken =
                    serde_json::from_value(payload.clone()).map_err(|e| TokenExchangeError {
                        status: Some(StatusCode::CREATED),
                        body: format!("missing token in response ({e}): {payload}"),
                    })?;
                info!(
                    installation_id,
                    expires_at = ?token.expires_at,
                    "obtained installation token"
                );
                Ok(token)
            }
            other => {
                let (status, body) = other.into_parts();
                error!(installation_id, ?status, %body, "installation token exchange failed");
                Err(TokenExchangeError { status, body })
            }
        }
    }
}
