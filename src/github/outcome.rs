use http::StatusCode;
use serde_json::Value;

/// Result of a single GitHub API round trip, classified at the transport
/// boundary so callers never inspect raw status codes.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Success { status: StatusCode, payload: Value },
    /// 409 or 422 from GitHub.
    Conflict { status: StatusCode, body: String },
    NotFound,
    /// 401 or 403 from GitHub.
    Denied { status: StatusCode, body: String },
    /// Any other status. `status` is `None` when no response arrived at all
    /// (connection failure, timeout).
    OtherError {
        status: Option<StatusCode>,
        body: String,
    },
}

impl RemoteOutcome {
    pub fn from_response(status: StatusCode, body: String) -> Self {
        match status {
            s if s.is_success() => {
                let payload = if body.trim().is_empty() {
                    Value::Null
                } else {
                    match serde_json::from_str(&body) {
                        Ok(payload) => payload,
                        Err(e) => {
                            return RemoteOutcome::OtherError {
                                status: Some(status),
                                body: format!("unparseable response body ({e}): {body}"),
                            };
                        }
                    }
                };
                RemoteOutcome::Success { status, payload }
            }
            StatusCode::NOT_FOUND => RemoteOutcome::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RemoteOutcome::Denied { status, body }
            }
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                RemoteOutcome::Conflict { status, body }
            }
            _ => RemoteOutcome::OtherError {
                status: Some(status),
                body,
            },
        }
    }

    pub fn transport_failure(reason: impl Into<String>) -> Self {
        RemoteOutcome::OtherError {
            status: None,
            body: reason.into(),
        }
    }

    /// Status and body for error reporting, regardless of variant.
    pub fn into_parts(self) -> (Option<StatusCode>, String) {
        match self {
            RemoteOutcome::Success { status, payload } => (Some(status), payload.to_string()),
            RemoteOutcome::Conflict { status, body } | RemoteOutcome::Denied { status, body } => {
                (Some(status), body)
            }
            RemoteOutcome::NotFound => (Some(StatusCode::NOT_FOUND), String::new()),
            RemoteOutcome::OtherError { status, body } => (status, body),
        }
    }
}
