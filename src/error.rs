//! Error taxonomy for the scanning engine.
//!
//! Failures fall into three groups:
//!
//! - transient API failures (network errors, 5xx, rate limits) which the
//!   [`RateLimitedClient`](crate::github::RateLimitedClient) retries and only
//!   surfaces as [`ScanError::TransientApi`] once its attempts are exhausted;
//! - per-target failures (`UserNotFound`, `AccessDenied`, `RepoFetch`, ...)
//!   which end up as an error entry for a single user or repository;
//! - run-level failures (`NoTargets`, org enumeration errors, bad rules)
//!   which abort the whole run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("GitHub API still failing after {attempts} attempts: {message}")]
    TransientApi {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("GitHub API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode GitHub response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("organization not found: {0}")]
    OrgNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("unauthorized (invalid token?)")]
    Unauthorized,

    #[error("failed to fetch {repo}: {source}")]
    RepoFetch {
        repo: String,
        #[source]
        source: Box<ScanError>,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no targets to scan")]
    NoTargets,

    #[error("invalid GitHub username: {0:?}")]
    InvalidUsername(String),

    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("invalid indicator rules: {0}")]
    Rules(String),

    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// Returns true for failures worth retrying: network errors, 5xx
    /// responses and rate limiting.
    pub fn is_transient(&self) -> bool {
        match self {
            ScanError::Network(_) | ScanError::TransientApi { .. } => true,
            ScanError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Short machine-friendly reason used in reports (`UserNotFound`, ...).
    pub fn reason(&self) -> &'static str {
        match self {
            ScanError::TransientApi { .. } => "TransientAPIError",
            ScanError::Http { .. } => "HttpError",
            ScanError::Network(_) => "NetworkError",
            ScanError::Json(_) => "DecodeError",
            ScanError::OrgNotFound(_) => "OrgNotFound",
            ScanError::UserNotFound(_) => "UserNotFound",
            ScanError::AccessDenied(_) => "AccessDenied",
            ScanError::Unauthorized => "Unauthorized",
            ScanError::RepoFetch { .. } => "RepoFetchError",
            ScanError::InvalidUrl(_) => "InvalidUrl",
            ScanError::NoTargets => "NoTargets",
            ScanError::InvalidUsername(_) => "InvalidUsername",
            ScanError::InvalidWorkerCount(_) => "InvalidWorkerCount",
            ScanError::Rules(_) => "InvalidRules",
            ScanError::Cancelled => "Cancelled",
        }
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
