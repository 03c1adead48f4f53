use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudClientErr {
    #[error("connection error: {0}")]
    ConnectError(String),
    #[error("unexpected HTTP status while fetching {resource}: {status}")]
    UnexpectedStatus { resource: String, status: u16 },
    #[error(transparent)]
    JsonParseError(#[from] serde_json::Error),
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

/// Normalized fetch failure classes used by page retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    RateLimited,
    UpstreamUnavailable,
    Unauthorized,
    Forbidden,
    NotFound,
    MalformedResponse,
    Other,
}

/// Typed fetch failure surfaced to the collector as a transport error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Network | FetchErrorKind::RateLimited | FetchErrorKind::UpstreamUnavailable
        )
    }
}

pub fn map_status_to_fetch_error(resource: &str, status: u16) -> FetchError {
    let kind = match status {
        401 => FetchErrorKind::Unauthorized,
        403 => FetchErrorKind::Forbidden,
        404 => FetchErrorKind::NotFound,
        408 => FetchErrorKind::Network,
        429 => FetchErrorKind::RateLimited,
        500..=599 => FetchErrorKind::UpstreamUnavailable,
        _ => FetchErrorKind::Other,
    };
    FetchError::new(kind, format!("HTTP {status} while fetching {resource}"))
}

pub fn map_cloud_error(error: CloudClientErr) -> FetchError {
    match error {
        CloudClientErr::UnexpectedStatus { resource, status } => {
            map_status_to_fetch_error(&resource, status)
        }
        CloudClientErr::RequestError(req_err) => {
            if let Some(status) = req_err.status() {
                return map_status_to_fetch_error("page", status.as_u16());
            }
            if req_err.is_timeout() || req_err.is_connect() || req_err.is_request() {
                return FetchError::new(
                    FetchErrorKind::Network,
                    format!("network/transport error while listing resources: {req_err}"),
                );
            }
            if req_err.is_decode() || req_err.is_body() {
                return FetchError::new(
                    FetchErrorKind::Network,
                    format!("response body error while listing resources (retryable): {req_err}"),
                );
            }
            FetchError::new(FetchErrorKind::Other, format!("{req_err:#}"))
        }
        CloudClientErr::JsonParseError(err) => FetchError::new(
            FetchErrorKind::MalformedResponse,
            format!("invalid JSON page from cloud API: {err}"),
        ),
        CloudClientErr::ConnectError(message) => {
            FetchError::new(FetchErrorKind::Network, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        assert!(map_status_to_fetch_error("vms", 429).is_retryable());
        assert!(map_status_to_fetch_error("vms", 503).is_retryable());
        assert!(map_status_to_fetch_error("vms", 408).is_retryable());
    }

    #[test]
    fn auth_failures_are_not_retryable() {
        let unauthorized = map_status_to_fetch_error("vms", 401);
        assert_eq!(unauthorized.kind, FetchErrorKind::Unauthorized);
        assert!(!unauthorized.is_retryable());
        assert_eq!(
            map_status_to_fetch_error("vms", 403).kind,
            FetchErrorKind::Forbidden
        );
    }

    #[test]
    fn json_errors_are_malformed_responses() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{")
            .expect_err("fixture should produce a json parse failure");
        let mapped = map_cloud_error(CloudClientErr::JsonParseError(parse_err));
        assert_eq!(mapped.kind, FetchErrorKind::MalformedResponse);
        assert!(!mapped.is_retryable());
    }
}
