use std::sync::Arc;

use axum::Router;
use axum_extra::routing::RouterExt;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    config::Settings, github::GitHubApi, oauth::OAuthLogin, provisioner::RepositoryProvisioner,
    registry::RepositoryRegistry,
};

pub mod config;
pub mod github;
pub mod oauth;
pub mod provisioner;
pub mod registry;
mod routes;
pub mod utils;

pub fn create_root_app(state: AppState) -> Router {
    Router::new()
        .typed_post(routes::repositories::create_repository_handler)
        .typed_get(routes::repositories::list_repositories_handler)
        .typed_get(routes::github_login::github_login_handler)
        .typed_get(routes::github_login::github_callback_handler)
        .typed_get(routes::health::health_handler)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<RepositoryProvisioner>,
    pub registry: RepositoryRegistry,
    pub oauth: Option<Arc<OAuthLogin>>,
}

impl AppState {
    pub fn new(settings: &Settings, api: Arc<dyn GitHubApi>) -> Result<Self, url::ParseError> {
        let oauth = match &settings.oauth {
            Some(oauth) => Some(Arc::new(OAuthLogin::new(
                oauth.clone(),
                &settings.web_url,
                api.clone(),
            )?)),
            None => None,
        };

        Ok(Self {
            provisioner: Arc::new(RepositoryProvisioner::from_settings(settings, api)),
            registry: RepositoryRegistry::new(),
            oauth,
        })
    }
}
