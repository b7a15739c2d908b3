use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppState, provisioner::ProvisionError, registry::RegisteredRepository};

#[derive(Debug, Deserialize)]
pub struct CreateRepositoryBody {
    name: String,
    #[serde(default)]
    description: String,
    organization: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRepositoriesQuery {
    organization: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_url: Option<String>,
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            status: self.remote_status().map(|status| status.as_u16()),
            existing_url: match self {
                ProvisionError::RepositoryAlreadyExists { existing_url } => Some(existing_url),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

pub async fn create_repository_handler(
    _: super::RepositoriesPath,
    State(state): State<AppState>,
    Json(req): Json<CreateRepositoryBody>,
) -> Result<(StatusCode, Json<RegisteredRepository>), ProvisionError> {
    info!(
        "provisioning repository \"{}\" for organization \"{}\"",
        req.name, req.organization
    );

    let record = state
        .provisioner
        .provision(&req.name, &req.description, &req.organization)
        .await?;
    let stored = state.registry.insert(record).await;

    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn list_repositories_handler(
    _: super::RepositoriesPath,
    State(state): State<AppState>,
    Query(query): Query<ListRepositoriesQuery>,
) -> Json<Vec<RegisteredRepository>> {
    let repositories = match query.organization {
        Some(organization) => state.registry.list_for_organization(&organization).await,
        None => state.registry.list().await,
    };
    Json(repositories)
}
