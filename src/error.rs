//! Error handling for the lansweep service
//!
//! Every failure a scan request can hit is a variant of [`ScanError`]. The HTTP
//! layer maps variants to status codes; the orchestrator decides which probe
//! failures are recoverable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong inside a probe invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCause {
    /// The tool ran but its structured output could not be decoded
    Parse,
    /// The tool could not be started, or exited with an error
    Process,
}

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Target not allowed: {0} is outside the private address ranges")]
    TargetNotAllowed(String),

    #[error("Target too large: range covers {estimate} hosts; server limit is {limit}")]
    TargetTooLarge { estimate: u64, limit: u64 },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("A scan is already in progress")]
    ScanInProgress,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Probe failed ({cause:?}): {detail}")]
    ProbeFailed { cause: ProbeCause, detail: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Shorthand for a parse failure of the probe output
    pub fn probe_parse(detail: impl Into<String>) -> Self {
        ScanError::ProbeFailed {
            cause: ProbeCause::Parse,
            detail: detail.into(),
        }
    }

    /// Shorthand for a process failure of the probe
    pub fn probe_process(detail: impl Into<String>) -> Self {
        ScanError::ProbeFailed {
            cause: ProbeCause::Process,
            detail: detail.into(),
        }
    }

    /// True for errors caused by the caller's request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_)
                | ScanError::TargetNotAllowed(_)
                | ScanError::TargetTooLarge { .. }
                | ScanError::ProfileNotFound(_)
                | ScanError::ScanInProgress
                | ScanError::InvalidOption(_)
        )
    }

    /// Stable short label used as the `error` field of API responses
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::InvalidTarget(_) => "Invalid target",
            ScanError::TargetNotAllowed(_) => "Target not allowed",
            ScanError::TargetTooLarge { .. } => "Target too large",
            ScanError::ProfileNotFound(_) => "Profile not found",
            ScanError::ScanInProgress => "Scan in progress",
            ScanError::InvalidOption(_) => "Invalid option",
            ScanError::ProbeFailed { .. }
            | ScanError::ConfigError(_)
            | ScanError::IoError(_)
            | ScanError::Internal(_) => "Scan failed",
        }
    }

    /// Human readable detail, without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            ScanError::InvalidTarget(msg)
            | ScanError::ProfileNotFound(msg)
            | ScanError::InvalidOption(msg)
            | ScanError::ConfigError(msg)
            | ScanError::Internal(msg) => msg.clone(),
            ScanError::TargetNotAllowed(token) => format!(
                "{} is outside 10.0.0.0/8, 172.16.0.0/12 and 192.168.0.0/16",
                token
            ),
            ScanError::TargetTooLarge { estimate, limit } => format!(
                "CIDR covers {} hosts; server limit is {}. Use a smaller CIDR (e.g. /24) or raise MAX_HOSTS.",
                estimate, limit
            ),
            ScanError::ScanInProgress => {
                "another scan is running; retry once it has finished".to_string()
            }
            ScanError::ProbeFailed { detail, .. } => detail.clone(),
            ScanError::IoError(e) => e.to_string(),
        }
    }
}

/// Cut `text` down to at most `limit` characters, marking the cut
pub fn truncate_detail(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(limit).collect();
    out.push_str("...");
    out
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<quick_xml::DeError> for ScanError {
    fn from(e: quick_xml::DeError) -> Self {
        ScanError::probe_parse(e.to_string())
    }
}
