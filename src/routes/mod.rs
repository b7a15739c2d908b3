use axum_extra::routing::TypedPath;
use serde::Deserialize;

pub mod github_login;
pub mod health;
pub mod repositories;

#[derive(TypedPath, Deserialize)]
#[typed_path("/repositories")]
pub struct RepositoriesPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/github/login")]
pub struct GitHubLoginPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/github/callback")]
pub struct GitHubCallbackPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/health")]
pub struct HealthPath;
