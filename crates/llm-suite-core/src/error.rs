//! Classified pipeline failures.
//!
//! Every pipeline stage returns either a value or a [`PipelineError`].
//! Stages never substitute defaults for failures and never retry; the
//! caller branches on [`PipelineError::kind`] and shows the `Display`
//! message to the user.

use std::fmt;

/// Cause of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The URL could not be parsed or has no `http`/`https` scheme.
    MalformedUrl,
    /// Host name resolution failed.
    Dns,
    /// The remote host actively refused the connection.
    ConnectionRefused,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Any other connection-level failure (reset, TLS, proxy).
    Connection,
    /// The connection broke while reading the response body.
    Body,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::MalformedUrl => "malformed URL",
            TransportKind::Dns => "DNS lookup failed",
            TransportKind::ConnectionRefused => "connection refused",
            TransportKind::Timeout => "request timed out",
            TransportKind::Connection => "connection failed",
            TransportKind::Body => "response body interrupted",
        };
        f.write_str(s)
    }
}

/// Why a remote service rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// HTTP 429 or an explicit quota error.
    RateLimited,
    /// The service refused the request itself (HTTP 400-class).
    Rejected,
    /// The model refused to answer (safety filtering).
    Blocked,
    /// Any other non-2xx status.
    HttpStatus,
    /// The response arrived but could not be decoded.
    InvalidResponse,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionReason::RateLimited => "rate limit or quota exceeded",
            RejectionReason::Rejected => "request rejected",
            RejectionReason::Blocked => "blocked by content filter",
            RejectionReason::HttpStatus => "unexpected HTTP status",
            RejectionReason::InvalidResponse => "invalid response",
        };
        f.write_str(s)
    }
}

/// Flat classification of a [`PipelineError`], for branching in the
/// presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    RemoteRejection,
    EmptyContent,
    UnsupportedFormat,
    Unreadable,
    InvalidInput,
}

/// The closed set of failures a pipeline run can end with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Missing or invalid credential, or invalid configuration.
    /// Raised before any network call when detectable locally.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind}: {detail}")]
    Transport { kind: TransportKind, detail: String },

    #[error("{}", format_rejection(.reason, .status, .detail))]
    RemoteRejection {
        reason: RejectionReason,
        status: Option<u16>,
        detail: String,
    },

    /// Extraction succeeded transport-wise but produced no usable text.
    #[error("no usable content: {0}")]
    EmptyContent(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The input stream is corrupt or could not be parsed.
    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn format_rejection(reason: &RejectionReason, status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("{} (HTTP {}): {}", reason, code, detail),
        None => format!("{}: {}", reason, detail),
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Transport { .. } => ErrorKind::Transport,
            PipelineError::RemoteRejection { .. } => ErrorKind::RemoteRejection,
            PipelineError::EmptyContent(_) => ErrorKind::EmptyContent,
            PipelineError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            PipelineError::Unreadable(_) => ErrorKind::Unreadable,
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn transport(kind: TransportKind, detail: impl Into<String>) -> Self {
        PipelineError::Transport {
            kind,
            detail: detail.into(),
        }
    }

    pub fn rejection(reason: RejectionReason, status: Option<u16>, detail: impl Into<String>) -> Self {
        PipelineError::RemoteRejection {
            reason,
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid_response(detail: impl Into<String>) -> Self {
        Self::rejection(RejectionReason::InvalidResponse, None, detail)
    }

    /// The transport cause, if this is a transport failure.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            PipelineError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The rejection reason, if the remote side refused the request.
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            PipelineError::RemoteRejection { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
