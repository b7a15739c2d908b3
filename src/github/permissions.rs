use std::{collections::BTreeMap, sync::Arc};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{GitHubApi, RemoteOutcome, SignedAssertion};

/// Permission GitHub requires for `POST /orgs/{org}/repos` as an App.
pub const REPOSITORY_CREATION_PERMISSION: &str = "administration";

#[derive(Debug, thiserror::Error)]
pub enum PermissionsUnavailable {
    #[error("GitHub denied the installation lookup (status {status}): {body}")]
    Denied { status: StatusCode, body: String },

    #[error("installation lookup failed (status {status:?}): {body}")]
    Remote {
        status: Option<StatusCode>,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

/// Permissions granted to an App installation, keyed by permission name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<String, AccessLevel>);

impl PermissionSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn level(&self, permission: &str) -> Option<AccessLevel> {
        self.0.get(permission).copied()
    }

    pub fn allows_repository_creation(&self) -> bool {
        self.level(REPOSITORY_CREATION_PERMISSION)
            .is_some_and(|level| level >= AccessLevel::Write)
    }
}

impl FromIterator<(String, AccessLevel)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (String, AccessLevel)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
struct InstallationPayload {
    #[serde(default)]
    permissions: BTreeMap<String, serde_json::Value>,
}

impl InstallationPayload {
    /// Unknown access levels are dropped rather than failing the lookup.
    fn into_permission_set(self) -> PermissionSet {
        self.permissions
            .into_iter()
            .filter_map(|(name, level)| {
                serde_json::from_value::<AccessLevel>(level)
                    .ok()
                    .map(|level| (name, level))
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct PermissionVerifier {
    api: Arc<dyn GitHubApi>,
}

impl PermissionVerifier {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    /// Looks up the installation's permissions with the App JWT.
    pub async fn verify(
        &self,
        assertion: &SignedAssertion,
        installation_id: u64,
    ) -> Result<PermissionSet, PermissionsUnavailable> {
        match self
            .api
            .get_installation(assertion.as_str(), installation_id)
            .await
        {
            RemoteOutcome::Success {
                status: StatusCode::OK,
                payload,
            } => {
                let installation: InstallationPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| PermissionsUnavailable::Remote {
                        status: Some(StatusCode::OK),
                        body: format!("unexpected installation payload ({e}): {payload}"),
                    })?;
                let permissions = installation.into_permission_set();
                if permissions.is_empty() {
                    warn!(installation_id, "installation grants no permissions");
                } else {
                    info!(installation_id, ?permissions, "fetched installation permissions");
                }
                Ok(permissions)
            }
            RemoteOutcome::Denied { status, body } => {
                error!(installation_id, %status, %body, "installation lookup denied");
                Err(PermissionsUnavailable::Denied { status, body })
            }
            other => {
                let (status, body) = other.into_parts();
                error!(installation_id, ?status, %body, "installation lookup failed");
                Err(PermissionsUnavailable::Remote { status, body })
            }
        }
    }
}
