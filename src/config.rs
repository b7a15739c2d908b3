use std::{fmt, sync::Arc, time::Duration};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_WEB_URL: &str = "https://github.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Identity of the GitHub App, shared read-only by every provisioning call.
#[derive(Clone)]
pub struct AppCredential {
    pub app_id: u64,
    pub installation_id: u64,
    private_key: String,
}

impl AppCredential {
    pub fn new(app_id: u64, installation_id: u64, private_key: impl Into<String>) -> Self {
        Self {
            app_id,
            installation_id,
            private_key: unescape_pem(&private_key.into()),
        }
    }

    pub(crate) fn private_key_pem(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredential")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Credentials for the "Sign in with GitHub" OAuth application.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credential: Arc<AppCredential>,
    pub repository_owner: String,
    pub private_repositories: bool,
    pub api_url: String,
    pub web_url: String,
    pub http_timeout: Duration,
    pub oauth: Option<OAuthSettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let app_id = parse_u64("GITHUB_APP_ID", &required("GITHUB_APP_ID")?)?;
        let installation_id =
            parse_u64("GITHUB_INSTALLATION_ID", &required("GITHUB_INSTALLATION_ID")?)?;
        let private_key = required("GITHUB_APP_PRIVATE_KEY")?;
        let repository_owner = required("GITHUB_REPOSITORY_OWNER")?;

        let private_repositories = match lookup("GITHUB_REPOSITORY_PRIVATE") {
            Some(value) => parse_bool("GITHUB_REPOSITORY_PRIVATE", &value)?,
            None => false,
        };

        let api_url = lookup("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let api_url = parse_base_url("GITHUB_API_URL", &api_url)?;
        let web_url = lookup("GITHUB_WEB_URL").unwrap_or_else(|| DEFAULT_WEB_URL.into());
        let web_url = parse_base_url("GITHUB_WEB_URL", &web_url)?;

        let http_timeout = match lookup("GITHUB_HTTP_TIMEOUT_SECS") {
            Some(value) => match parse_u64("GITHUB_HTTP_TIMEOUT_SECS", &value)? {
                0 => {
                    return Err(ConfigError::Invalid {
                        name: "GITHUB_HTTP_TIMEOUT_SECS",
                        reason: "must be greater than zero".into(),
                    });
                }
                secs => Duration::from_secs(secs),
            },
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let oauth = match (
            lookup("GITHUB_CLIENT_ID"),
            lookup("GITHUB_CLIENT_SECRET"),
            lookup("GITHUB_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(OAuthSettings {
                client_id,
                client_secret,
                redirect_uri,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    name: "GITHUB_CLIENT_ID",
                    reason: "GITHUB_CLIENT_ID, GITHUB_CLIENT_SECRET and GITHUB_REDIRECT_URI \
                             must be set together"
                        .into(),
                });
            }
        };

        Ok(Self {
            credential: Arc::new(AppCredential::new(app_id, installation_id, private_key)),
            repository_owner,
            private_repositories,
            api_url,
            web_url,
            http_timeout,
            oauth,
        })
    }
}

/// Keys passed through env files usually arrive with literal `\n` sequences.
pub(crate) fn unescape_pem(raw: &str) -> String {
    raw.trim().replace("\\n", "\n")
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_base_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(value.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
