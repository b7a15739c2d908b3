use std::time::Duration;

use octocrab::service::middleware::retry::RetryConfig;

pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const JSON_ACCEPT: &str = "application/json";

/// Builds a one-shot octocrab client rooted at `base`.
///
/// `bearer` is either an App JWT or an installation/user token; octocrab sends
/// both as `Authorization: Bearer`, but only to the authority of `base`.
/// Retries are disabled so every failure is surfaced to the caller exactly once.
pub fn build_octocrab(
    base: &str,
    bearer: Option<&str>,
    accept: &str,
    timeout: Duration,
) -> Result<octocrab::Octocrab, octocrab::Error> {
    let mut builder = octocrab::Octocrab::builder()
        .base_uri(base)?
        .add_header(http::header::ACCEPT, accept.to_string())
        .add_retry_config(RetryConfig::None)
        .set_connect_timeout(Some(timeout))
        .set_read_timeout(Some(timeout));

    if let Some(token) = bearer {
        builder = builder.personal_token(token.to_string());
    }

    builder.build()
}
