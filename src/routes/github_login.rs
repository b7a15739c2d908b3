use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    AppState,
    oauth::{GitHubUser, OAuthError},
};

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignedInUser {
    username: String,
    email: Option<String>,
    name: Option<String>,
}

impl From<GitHubUser> for SignedInUser {
    fn from(user: GitHubUser) -> Self {
        Self {
            username: user.login,
            email: user.email,
            name: user.name,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            OAuthError::InvalidState | OAuthError::Rejected(_) => StatusCode::BAD_REQUEST,
            OAuthError::Remote { .. } | OAuthError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn github_login_handler(
    _: super::GitHubLoginPath,
    State(state): State<AppState>,
) -> Result<Redirect, StatusCode> {
    let oauth = state.oauth.ok_or(StatusCode::NOT_FOUND)?;
    let url = oauth.begin().await;
    info!("redirecting to GitHub for authorization");
    Ok(Redirect::to(&url))
}

pub async fn github_callback_handler(
    _: super::GitHubCallbackPath,
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<SignedInUser>, Response> {
    let oauth = state
        .oauth
        .ok_or_else(|| StatusCode::NOT_FOUND.into_response())?;

    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Authorization failed. Missing code or state.",
        )
            .into_response());
    };

    let user = oauth.complete(&code, &csrf_state).await.map_err(|e| {
        error!("GitHub sign-in failed: {:?}", e);
        e.into_response()
    })?;

    Ok(Json(user.into()))
}
