//! Recording in-memory GitHub used by unit tests.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;

use super::{GitHubApi, NewRepository, OAuthCodeExchange, RemoteOutcome};

pub(crate) const MOCK_INSTALLATION_TOKEN: &str = "ghs_mock_installation_token";

/// Outcomes queued for one endpoint. An empty queue falls back to the
/// simulated behaviour.
#[derive(Default)]
pub(crate) struct Script(Mutex<VecDeque<RemoteOutcome>>);

impl Script {
    pub(crate) fn set(&self, outcome: RemoteOutcome) {
        let mut queue = self.0.lock().unwrap();
        queue.clear();
        queue.push_back(outcome);
    }

    /// Queues an outcome that is returned once before the next one.
    pub(crate) fn push(&self, outcome: RemoteOutcome) {
        self.0.lock().unwrap().push_back(outcome);
    }

    fn next(&self) -> Option<RemoteOutcome> {
        let mut queue = self.0.lock().unwrap();
        // the last scripted outcome sticks
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub endpoint: String,
    pub credential: String,
}

#[derive(Default)]
pub(crate) struct MockGitHub {
    pub installation: Script,
    pub token: Script,
    pub repository: Script,
    pub create: Script,
    pub oauth: Script,
    pub user: Script,
    repositories: Mutex<BTreeSet<(String, String)>>,
    created: Mutex<Vec<NewRepository>>,
    recorded: Mutex<Vec<RecordedCall>>,
}

impl MockGitHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_repository(self, owner: &str, name: &str) -> Self {
        self.repositories
            .lock()
            .unwrap()
            .insert((owner.to_string(), name.to_string()));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.endpoint.clone())
            .collect()
    }

    pub(crate) fn created_repositories(&self) -> Vec<NewRepository> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn recorded(&self) -> Vec<RecordedCall> {
        self.recorded.lock().unwrap().clone()
    }

    fn record(&self, endpoint: String, credential: &str) {
        self.recorded.lock().unwrap().push(RecordedCall {
            endpoint,
            credential: credential.to_string(),
        });
    }
}

fn html_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{owner}/{name}")
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn create_installation_token(
        &self,
        app_jwt: &str,
        installation_id: u64,
    ) -> RemoteOutcome {
        self.record(format!("create_installation_token {installation_id}"), app_jwt);
        self.token.next().unwrap_or_else(|| RemoteOutcome::Success {
            status: StatusCode::CREATED,
            payload: json!({
                "token": MOCK_INSTALLATION_TOKEN,
                "expires_at": "2026-10-19T21:00:00Z"
            }),
        })
    }

    async fn get_installation(&self, app_jwt: &str, installation_id: u64) -> RemoteOutcome {
        self.record(format!("get_installation {installation_id}"), app_jwt);
        self.installation
            .next()
            .unwrap_or_else(|| RemoteOutcome::Success {
                status: StatusCode::OK,
                payload: json!({
                    "id": installation_id,
                    "permissions": {"administration": "write", "metadata": "read"}
                }),
            })
    }

    async fn get_repository(&self, token: &str, owner: &str, name: &str) -> RemoteOutcome {
        self.record(format!("get_repository {owner}/{name}"), token);
        if let Some(outcome) = self.repository.next() {
            return outcome;
        }
        let exists = self
            .repositories
            .lock()
            .unwrap()
            .contains(&(owner.to_string(), name.to_string()));
        if exists {
            RemoteOutcome::Success {
                status: StatusCode::OK,
                payload: json!({"name": name, "html_url": html_url(owner, name)}),
            }
        } else {
            RemoteOutcome::NotFound
        }
    }

    async fn create_organization_repository(
        &self,
        token: &str,
        owner: &str,
        repository: &NewRepository,
    ) -> RemoteOutcome {
        self.record(
            format!("create_organization_repository {owner}/{}", repository.name),
            token,
        );
        self.created.lock().unwrap().push(repository.clone());
        if let Some(outcome) = self.create.next() {
            return outcome;
        }
        let inserted = self
            .repositories
            .lock()
            .unwrap()
            .insert((owner.to_string(), repository.name.clone()));
        if inserted {
            RemoteOutcome::Success {
                status: StatusCode::CREATED,
                payload: json!({
                    "name": repository.name,
                    "private": repository.private,
                    "html_url": html_url(owner, &repository.name)
                }),
            }
        } else {
            RemoteOutcome::Conflict {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: r#"{"message":"Repository creation failed.","errors":[{"resource":"Repository","code":"custom","field":"name","message":"name already exists on this account"}]}"#.into(),
            }
        }
    }

    async fn exchange_oauth_code(&self, exchange: &OAuthCodeExchange) -> RemoteOutcome {
        self.record("exchange_oauth_code".into(), &exchange.code);
        self.oauth.next().unwrap_or_else(|| RemoteOutcome::Success {
            status: StatusCode::OK,
            payload: json!({
                "access_token": "gho_mock_user_token",
                "token_type": "bearer",
                "scope": "read:user,user:email"
            }),
        })
    }

    async fn get_authenticated_user(&self, access_token: &str) -> RemoteOutcome {
        self.record("get_authenticated_user".into(), access_token);
        self.user.next().unwrap_or_else(|| RemoteOutcome::Success {
            status: StatusCode::OK,
            payload: json!({
                "id": 42,
                "login": "octocat",
                "name": "Mona Lisa Octocat",
                "email": "octocat@github.com"
            }),
        })
    }
}
