use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    repository_owner: String,
    oauth_enabled: bool,
}

pub async fn health_handler(
    _: super::HealthPath,
    State(state): State<AppState>,
) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        repository_owner: state.provisioner.owner().to_string(),
        oauth_enabled: state.oauth.is_some(),
    })
}
