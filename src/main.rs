use std::{net::SocketAddr, sync::Arc};

use npo_github::{AppState, config::Settings, github::GitHubClient};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum ServerError {
    Config(npo_github::config::ConfigError),
    OAuthUrl(url::ParseError),
    InvalidAddress(std::net::AddrParseError),
    TcpBind(std::io::Error),
    Run(std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env().map_err(|e| {
        error!("invalid configuration: {}", e);
        ServerError::Config(e)
    })?;
    info!(
        app_id = settings.credential.app_id,
        installation_id = settings.credential.installation_id,
        owner = %settings.repository_owner,
        "configuration loaded"
    );

    let client = GitHubClient::new(
        settings.api_url.clone(),
        settings.web_url.clone(),
        settings.http_timeout,
    );
    let state = AppState::new(&settings, Arc::new(client)).map_err(ServerError::OAuthUrl)?;
    if state.oauth.is_none() {
        info!("GitHub sign-in disabled, OAuth client not configured");
    }

    let app = npo_github::create_root_app(state);

    let tcp_listener = get_tcp_listener().await?;
    let server = axum::serve(tcp_listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    info!("server starting");

    if let Err(e) = server.await {
        error!("server error: {:?}", e);
        return Err(ServerError::Run(e));
    }

    info!("server stopped");
    Ok(())
}

async fn get_tcp_listener() -> Result<TcpListener, ServerError> {
    let host = std::env::var("APP_HOST").unwrap_or_else(|_| String::from("0.0.0.0"));
    let port = std::env::var("APP_PORT").unwrap_or_else(|_| String::from("3000"));
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(ServerError::InvalidAddress)?;
    info!("binding to {}", addr);

    TcpListener::bind(addr).await.map_err(ServerError::TcpBind)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
