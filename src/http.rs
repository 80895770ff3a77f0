//! Shared HTTP plumbing: client construction and failure classification.
//!
//! Every remote call (page fetch, embedding, generation) maps reqwest
//! errors and non-2xx statuses through this module so callers see the
//! same [`PipelineError`] kinds regardless of which service failed.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::StatusCode;

use llm_suite_core::{PipelineError, RejectionReason, TransportKind};

/// Longest response-body excerpt carried in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Error reason Gemini returns with HTTP 400 for a bad key.
const INVALID_KEY_REASON: &str = "API_KEY_INVALID";

/// Build a client with a total request timeout.
pub fn build_client(timeout_secs: u64, user_agent: Option<&str>) -> Result<reqwest::Client, PipelineError> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs));
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    finish_client(builder)
}

/// Build a client for generation calls.
///
/// Connecting and each read of the body are bounded by `timeout_secs`;
/// the response as a whole is not, so a long streamed reply is never cut
/// off while increments keep arriving.
pub fn build_streaming_client(timeout_secs: u64) -> Result<reqwest::Client, PipelineError> {
    let timeout = Duration::from_secs(timeout_secs);
    finish_client(
        reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout),
    )
}

fn finish_client(builder: reqwest::ClientBuilder) -> Result<reqwest::Client, PipelineError> {
    builder
        .build()
        .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Parse and check an `http`/`https` URL.
pub fn parse_http_url(raw: &str) -> Result<reqwest::Url, PipelineError> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed).map_err(|e| {
        PipelineError::transport(
            TransportKind::MalformedUrl,
            format!(
                "'{}' is not a valid URL ({}); it must start with http:// or https://",
                trimmed, e
            ),
        )
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PipelineError::transport(
                TransportKind::MalformedUrl,
                format!("unsupported URL scheme '{}' in '{}'", other, trimmed),
            ))
        }
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(PipelineError::transport(
            TransportKind::MalformedUrl,
            format!("'{}' has no host", trimmed),
        ));
    }
    Ok(url)
}

/// Classify a reqwest send/read failure.
pub fn classify_reqwest_error(err: &reqwest::Error) -> PipelineError {
    let detail = error_chain(err);

    let kind = if err.is_timeout() {
        TransportKind::Timeout
    } else if err.is_builder() {
        TransportKind::MalformedUrl
    } else if err.is_body() || err.is_decode() {
        TransportKind::Body
    } else if is_connection_refused(err) {
        TransportKind::ConnectionRefused
    } else if is_dns_failure(&detail) {
        TransportKind::Dns
    } else {
        TransportKind::Connection
    };
    PipelineError::transport(kind, detail)
}

/// Classify a non-2xx response from an API service.
///
/// 401/403 mean the credential was rejected and are reported as
/// configuration errors. So is a 400 whose body carries Gemini's
/// `API_KEY_INVALID` reason.
pub fn classify_status(status: StatusCode, body: &str, service: &str) -> PipelineError {
    let excerpt = excerpt(body);
    let code = status.as_u16();
    match code {
        401 | 403 => PipelineError::Config(format!(
            "{} rejected the credential (HTTP {}): {}",
            service, code, excerpt
        )),
        400 if body.contains(INVALID_KEY_REASON) => PipelineError::Config(format!(
            "{} rejected the API key (HTTP {}): {}",
            service, code, excerpt
        )),
        429 => PipelineError::rejection(RejectionReason::RateLimited, Some(code), excerpt),
        400..=499 => PipelineError::rejection(RejectionReason::Rejected, Some(code), excerpt),
        _ => PipelineError::rejection(RejectionReason::HttpStatus, Some(code), excerpt),
    }
}

/// Read the body of a failed response and classify it.
pub async fn error_from_response(response: reqwest::Response, service: &str) -> PipelineError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body, service)
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Join an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn is_dns_failure(chain: &str) -> bool {
    let lower = chain.to_ascii_lowercase();
    lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
        || lower.contains("nodename nor servname")
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_suite_core::ErrorKind;

    #[test]
    fn missing_scheme_is_malformed() {
        let err = parse_http_url("example.com/page").unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportKind::MalformedUrl));
    }

    #[test]
    fn non_http_scheme_is_malformed() {
        let err = parse_http_url("ftp://example.com/file").unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportKind::MalformedUrl));
        assert!(parse_http_url("mailto:someone@example.com").is_err());
    }

    #[test]
    fn well_formed_url_parses() {
        let url = parse_http_url("  https://example.com/a?b=c ").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key", "Gemini").kind(),
            ErrorKind::Config
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "", "Gemini").kind(),
            ErrorKind::Config
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "quota", "Gemini").rejection_reason(),
            Some(RejectionReason::RateLimited)
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "", "Gemini").rejection_reason(),
            Some(RejectionReason::Rejected)
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "", "Gemini").rejection_reason(),
            Some(RejectionReason::HttpStatus)
        );
    }

    #[test]
    fn invalid_gemini_key_is_a_configuration_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        let err = classify_status(StatusCode::BAD_REQUEST, body, "Gemini embedding service");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("Gemini embedding service"));

        let other = r#"{"error":{"code":400,"status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, other, "Gemini").rejection_reason(),
            Some(RejectionReason::Rejected)
        );
    }

    #[test]
    fn long_bodies_are_shortened() {
        let body = "x".repeat(1000);
        let err = classify_status(StatusCode::BAD_REQUEST, &body, "svc");
        assert!(err.to_string().chars().count() < 400);
    }

    #[test]
    fn dns_markers() {
        assert!(is_dns_failure("error sending request: dns error: failed to lookup address information"));
        assert!(!is_dns_failure("connection reset by peer"));
    }
}
