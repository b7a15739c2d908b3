use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use super::RemoteOutcome;
use crate::utils::{GITHUB_ACCEPT, JSON_ACCEPT};

/// Body of `POST /orgs/{owner}/repos`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
}

/// Body of `POST /login/oauth/access_token`.
#[derive(Clone, Serialize)]
pub struct OAuthCodeExchange {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthCodeExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCodeExchange")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// The GitHub endpoints this service talks to. Every call resolves to a
/// [`RemoteOutcome`]; implementations never panic or retry.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `POST /app/installations/{installation_id}/access_tokens`
    async fn create_installation_token(&self, app_jwt: &str, installation_id: u64)
    -> RemoteOutcome;

    /// `GET /app/installations/{installation_id}`
    async fn get_installation(&self, app_jwt: &str, installation_id: u64) -> RemoteOutcome;

    /// `GET /repos/{owner}/{name}`
    async fn get_repository(&self, token: &str, owner: &str, name: &str) -> RemoteOutcome;

    /// `POST /orgs/{owner}/repos`
    async fn create_organization_repository(
        &self,
        token: &str,
        owner: &str,
        repository: &NewRepository,
    ) -> RemoteOutcome;

    /// `POST {web}/login/oauth/access_token`
    async fn exchange_oauth_code(&self, exchange: &OAuthCodeExchange) -> RemoteOutcome;

    /// `GET /user`
    async fn get_authenticated_user(&self, access_token: &str) -> RemoteOutcome;
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Post,
}

/// octocrab-backed [`GitHubApi`].
#[derive(Clone, Debug)]
pub struct GitHubClient {
    api_url: String,
    web_url: String,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, web_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Sends `path` relative to `base`, which is either the API or the web URL.
    async fn execute<B>(
        &self,
        verb: Verb,
        base: &str,
        path: String,
        bearer: Option<&str>,
        accept: &str,
        body: Option<&B>,
    ) -> RemoteOutcome
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = format!("{base}{path}");
        let octocrab = match crate::utils::build_octocrab(base, bearer, accept, self.timeout) {
            Ok(octocrab) => octocrab,
            Err(e) => {
                error!("failed to build octocrab client: {:?}", e);
                return RemoteOutcome::transport_failure(e.to_string());
            }
        };

        let request = async {
            let response = match verb {
                Verb::Get => octocrab._get(path.as_str()).await?,
                Verb::Post => octocrab._post(path.as_str(), body).await?,
            };
            let status = response.status();
            let text = octocrab.body_to_string(response).await?;
            Ok::<_, octocrab::Error>((status, text))
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok((status, text))) => {
                debug!(?verb, %url, %status, "github request completed");
                RemoteOutcome::from_response(status, text)
            }
            Ok(Err(e)) => {
                error!(?verb, %url, "github request failed: {:?}", e);
                RemoteOutcome::transport_failure(e.to_string())
            }
            Err(_) => {
                error!(?verb, %url, timeout = ?self.timeout, "github request timed out");
                RemoteOutcome::transport_failure(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            }
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn create_installation_token(
        &self,
        app_jwt: &str,
        installation_id: u64,
    ) -> RemoteOutcome {
        let path = format!("/app/installations/{installation_id}/access_tokens");
        self.execute(
            Verb::Post,
            &self.api_url,
            path,
            Some(app_jwt),
            GITHUB_ACCEPT,
            None::<&()>,
        )
        .await
    }

    async fn get_installation(&self, app_jwt: &str, installation_id: u64) -> RemoteOutcome {
        let path = format!("/app/installations/{installation_id}");
        self.execute(
            Verb::Get,
            &self.api_url,
            path,
            Some(app_jwt),
            GITHUB_ACCEPT,
            None::<&()>,
        )
        .await
    }

    async fn get_repository(&self, token: &str, owner: &str, name: &str) -> RemoteOutcome {
        let path = format!("/repos/{owner}/{name}");
        self.execute(
            Verb::Get,
            &self.api_url,
            path,
            Some(token),
            GITHUB_ACCEPT,
            None::<&()>,
        )
        .await
    }

    async fn create_organization_repository(
        &self,
        token: &str,
        owner: &str,
        repository: &NewRepository,
    ) -> RemoteOutcome {
        let path = format!("/orgs/{owner}/repos");
        self.execute(
            Verb::Post,
            &self.api_url,
            path,
            Some(token),
            GITHUB_ACCEPT,
            Some(repository),
        )
        .await
    }

    async fn exchange_oauth_code(&self, exchange: &OAuthCodeExchange) -> RemoteOutcome {
        let path = "/login/oauth/access_token".to_string();
        self.execute(
            Verb::Post,
            &self.web_url,
            path,
            None,
            JSON_ACCEPT,
            Some(exchange),
        )
        .await
    }

    async fn get_authenticated_user(&self, access_token: &str) -> RemoteOutcome {
        self.execute(
            Verb::Get,
            &self.api_url,
            "/user".to_string(),
            Some(access_token),
            GITHUB_ACCEPT,
            None::<&()>,
        )
        .await
    }
}
