//! Repository provisioning as the GitHub App installation.
//!
//! [`RepositoryProvisioner::provision`] runs a strict linear pipeline:
//! mint a JWT, check the installation's permissions, exchange the JWT for an
//! installation token, check whether the repository already exists and only
//! then create it. Nothing is retried; every failure aborts the pipeline and
//! no local state is touched before GitHub confirms the creation.

use std::{fmt, sync::Arc};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    config::{AppCredential, Settings},
    github::{
        CredentialError, CredentialMinter, GitHubApi, InstallationToken, NewRepository,
        PermissionSet, PermissionVerifier, PermissionsUnavailable, RemoteOutcome,
        TokenExchangeError, TokenExchanger,
    },
};

const MAX_REPOSITORY_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub description: String,
    pub organization: String,
    repository_url: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("repository url already assigned: {0}")]
pub struct UrlAlreadyAssigned(pub String);

impl RepositoryRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            organization: organization.into(),
            repository_url: None,
        }
    }

    pub fn repository_url(&self) -> Option<&str> {
        self.repository_url.as_deref()
    }

    /// The url can be assigned once.
    pub fn set_repository_url(&mut self, url: impl Into<String>) -> Result<(), UrlAlreadyAssigned> {
        if let Some(existing) = &self.repository_url {
            return Err(UrlAlreadyAssigned(existing.clone()));
        }
        self.repository_url = Some(url.into());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Start,
    PermissionChecked,
    TokenObtained,
    ExistenceChecked,
    Created,
    Rejected,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStage::Start => "start",
            ProvisionStage::PermissionChecked => "permission_checked",
            ProvisionStage::TokenObtained => "token_obtained",
            ProvisionStage::ExistenceChecked => "existence_checked",
            ProvisionStage::Created => "created",
            ProvisionStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid repository name {name:?}: {reason}")]
    InvalidRepositoryName { name: String, reason: &'static str },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("installation permissions unavailable: {0}")]
    PermissionsUnavailable(#[source] PermissionsUnavailable),

    #[error("GitHub App lacks permission to create repositories")]
    InsufficientPermissions { permissions: PermissionSet },

    #[error("installation token unavailable: {0}")]
    TokenUnavailable(#[source] TokenExchangeError),

    #[error("repository already exists at {existing_url}")]
    RepositoryAlreadyExists { existing_url: String },

    #[error("repository existence check failed (status {status:?}): {body}")]
    ExistenceCheckFailed {
        status: Option<StatusCode>,
        body: String,
    },

    #[error("repository creation failed (status {status:?}): {body}")]
    RepositoryCreationFailed {
        status: Option<StatusCode>,
        body: String,
    },
}

impl ProvisionError {
    /// HTTP status this failure is surfaced as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProvisionError::InvalidRepositoryName { .. } => StatusCode::BAD_REQUEST,
            ProvisionError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProvisionError::PermissionsUnavailable(_)
            | ProvisionError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            ProvisionError::TokenUnavailable(_) => StatusCode::UNAUTHORIZED,
            ProvisionError::RepositoryAlreadyExists { .. } => StatusCode::CONFLICT,
            ProvisionError::ExistenceCheckFailed { .. } => StatusCode::BAD_GATEWAY,
            ProvisionError::RepositoryCreationFailed { status, .. } => match status {
                Some(status) if status.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Status GitHub answered with, when the failure came from GitHub.
    pub fn remote_status(&self) -> Option<StatusCode> {
        match self {
            ProvisionError::PermissionsUnavailable(PermissionsUnavailable::Denied {
                status, ..
            }) => Some(*status),
            ProvisionError::PermissionsUnavailable(PermissionsUnavailable::Remote {
                status,
                ..
            })
            | ProvisionError::ExistenceCheckFailed { status, .. }
            | ProvisionError::RepositoryCreationFailed { status, .. } => *status,
            ProvisionError::TokenUnavailable(e) => e.status,
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct RepositoryProvisioner {
    minter: CredentialMinter,
    verifier: PermissionVerifier,
    exchanger: TokenExchanger,
    api: Arc<dyn GitHubApi>,
    owner: String,
    web_url: String,
    private: bool,
}

impl RepositoryProvisioner {
    pub fn new(
        credential: Arc<AppCredential>,
        api: Arc<dyn GitHubApi>,
        owner: impl Into<String>,
        web_url: impl Into<String>,
    ) -> Self {
        Self {
            minter: CredentialMinter::new(credential),
            verifier: PermissionVerifier::new(api.clone()),
            exchanger: TokenExchanger::new(api.clone()),
            api,
            owner: owner.into(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
            private: false,
        }
    }

    pub fn from_settings(settings: &Settings, api: Arc<dyn GitHubApi>) -> Self {
        Self::new(
            settings.credential.clone(),
            api,
            settings.repository_owner.clone(),
            settings.web_url.clone(),
        )
        .private_repositories(settings.private_repositories)
    }

    pub fn private_repositories(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: crate::github::credential::Clock) -> Self {
        self.minter = self.minter.with_clock(clock);
        self
    }

    /// Creates `name` under the configured owner and returns its record.
    ///
    /// Fails with [`ProvisionError::RepositoryAlreadyExists`] instead of
    /// touching an existing repository. Safe to call again after any failure:
    /// every call mints a new JWT and a new installation token.
    #[instrument(skip(self, description), fields(owner = %self.owner))]
    pub async fn provision(
        &self,
        name: &str,
        description: &str,
        organization: &str,
    ) -> Result<RepositoryRecord, ProvisionError> {
        let mut stage = ProvisionStage::Start;
        let result = self.run(name, description, organization, &mut stage).await;

        match &result {
            Ok(record) => info!(
                stage = %ProvisionStage::Created,
                url = record.repository_url().unwrap_or_default(),
                "repository provisioned"
            ),
            Err(e) => warn!(
                stage = %ProvisionStage::Rejected,
                failed_after = %stage,
                error = %e,
                "repository provisioning rejected"
            ),
        }

        result
    }

    async fn run(
        &self,
        name: &str,
        description: &str,
        organization: &str,
        stage: &mut ProvisionStage,
    ) -> Result<RepositoryRecord, ProvisionError> {
        validate_repository_name(name)?;

        let credential = self.minter.credential();
        let installation_id = credential.installation_id;
        let assertion = self.minter.mint()?;

        let permissions = match self.verifier.verify(&assertion, installation_id).await {
            Ok(permissions) => permissions,
            Err(PermissionsUnavailable::Denied { .. }) => {
                return Err(ProvisionError::InsufficientPermissions {
                    permissions: PermissionSet::default(),
                });
            }
            Err(e) => return Err(ProvisionError::PermissionsUnavailable(e)),
        };
        if !permissions.allows_repository_creation() {
            return Err(ProvisionError::InsufficientPermissions { permissions });
        }
        advance(stage, ProvisionStage::PermissionChecked);

        let token = self
            .exchanger
            .exchange(&assertion, installation_id)
            .await
            .map_err(ProvisionError::TokenUnavailable)?;
        advance(stage, ProvisionStage::TokenObtained);

        if let Some(existing_url) = self.find_existing(&token, name).await? {
            return Err(ProvisionError::RepositoryAlreadyExists { existing_url });
        }
        advance(stage, ProvisionStage::ExistenceChecked);

        let html_url = self.create(&token, name, description).await?;

        let mut record = RepositoryRecord::new(name, description, organization);
        record
            .set_repository_url(html_url)
            .map_err(|e| ProvisionError::RepositoryCreationFailed {
                status: Some(StatusCode::CREATED),
                body: e.to_string(),
            })?;
        Ok(record)
    }

    async fn find_existing(
        &self,
        token: &InstallationToken,
        name: &str,
    ) -> Result<Option<String>, ProvisionError> {
        match self
            .api
            .get_repository(token.as_str(), &self.owner, name)
            .await
        {
            RemoteOutcome::Success { payload, .. } => {
                Ok(Some(html_url(&payload).unwrap_or_else(|| self.canonical_url(name))))
            }
            RemoteOutcome::NotFound => Ok(None),
            other => {
                let (status, body) = other.into_parts();
                Err(ProvisionError::ExistenceCheckFailed { status, body })
            }
        }
    }

    async fn create(
        &self,
        token: &InstallationToken,
        name: &str,
        description: &str,
    ) -> Result<String, ProvisionError> {
        let repository = NewRepository {
            name: name.to_string(),
            description: description.to_string(),
            private: self.private,
        };

        match self
            .api
            .create_organization_repository(token.as_str(), &self.owner, &repository)
            .await
        {
            RemoteOutcome::Success {
                status: StatusCode::CREATED,
                payload,
            } => html_url(&payload).ok_or_else(|| ProvisionError::RepositoryCreationFailed {
                status: Some(StatusCode::CREATED),
                body: format!("response without html_url: {payload}"),
            }),
            // Lost a race with another provisioning call between the
            // existence check and the create.
            RemoteOutcome::Conflict { body, .. } if body.contains("already exists") => {
                Err(ProvisionError::RepositoryAlreadyExists {
                    existing_url: self.canonical_url(name),
                })
            }
            other => {
                let (status, body) = other.into_parts();
                Err(ProvisionError::RepositoryCreationFailed { status, body })
            }
        }
    }

    fn canonical_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.web_url, self.owner, name)
    }
}

fn advance(stage: &mut ProvisionStage, next: ProvisionStage) {
    info!(from = %stage, to = %next, "provisioning stage");
    *stage = next;
}

fn html_url(payload: &Value) -> Option<String> {
    payload
        .get("html_url")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn validate_repository_name(name: &str) -> Result<(), ProvisionError> {
    let invalid = |reason| ProvisionError::InvalidRepositoryName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_REPOSITORY_NAME_LEN {
        return Err(invalid("name is longer than 100 characters"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is reserved"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid("only ASCII letters, digits, '.', '_' and '-' are allowed"));
    }
    Ok(())
}
