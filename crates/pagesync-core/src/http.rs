//! Shared HTTP client construction and status mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};

use crate::config::DownloadConfig;
use crate::{Error, Result};

/// Build the client used for API calls and asset downloads.
pub fn build_client(config: &DownloadConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .user_agent(config.user_agent.clone())
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(Error::Network)
}

/// `Retry-After` in seconds, if present and numeric.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success status onto the error taxonomy.
///
/// 429 becomes [`Error::RateLimited`], 401/403 [`Error::Unauthorized`],
/// 404 [`Error::NotFound`]; everything else is [`Error::Remote`], which is
/// retryable for 408 and 5xx.
pub fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    url: &str,
    message: Option<String>,
) -> Error {
    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        StatusCode::NOT_FOUND => Error::NotFound(format!("{url}: {message}")),
        _ => Error::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let err = status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "u", None);
        assert!(matches!(
            err,
            Error::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert!(err.is_recoverable());

        let err = status_error(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "u", None);
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = status_error(StatusCode::NOT_FOUND, &HeaderMap::new(), "u", None);
        assert!(!err.is_recoverable());

        let err = status_error(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            "u",
            Some("upstream".to_string()),
        );
        assert!(matches!(err, Error::Remote { status: 502, ref message } if message == "upstream"));
        assert!(err.is_recoverable());

        let err = status_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), "u", None);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_client_builds_from_config() {
        assert!(build_client(&DownloadConfig::default()).is_ok());
    }
}
