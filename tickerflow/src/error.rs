use crate::category::{Category, Provider};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a [`SourceAdapter`](crate::provider::SourceAdapter) call failed.
///
/// Adapter failures are values, never panics, and are isolated to the [`Category`] being fetched.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FailureReason {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream responded with HTTP status {0}")]
    Status(u16),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    #[error("category not served by this provider")]
    Unsupported,

    #[error("entity key is not a valid request path segment: {0:?}")]
    InvalidKey(String),
}

impl FailureReason {
    /// Determine if the failure is likely to clear on a later refresh.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureReason::Timeout | FailureReason::Transport(_) => true,
            FailureReason::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FailureReason {
    /// The request url is stripped: it may carry a query parameter credential.
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            FailureReason::Timeout
        } else if let Some(status) = error.status() {
            FailureReason::Status(status.as_u16())
        } else if error.is_decode() {
            FailureReason::Decode(error.to_string())
        } else {
            FailureReason::Transport(error.to_string())
        }
    }
}

/// Per-category failure surfaced in a [`Snapshot`](crate::aggregator::Snapshot).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum CategoryError {
    #[error("no configured provider serves category: {0}")]
    NoProvider(Category),

    #[error("all providers failed for {category}: {}", fmt_failures(.failures))]
    AllProvidersFailed {
        category: Category,
        failures: Vec<(Provider, FailureReason)>,
    },

    #[error("fetch task for {0} terminated before completing: {1}")]
    Aborted(Category, String),

    #[error("empty ticker requested for {0}")]
    EmptyTicker(Category),
}

fn fmt_failures(failures: &[(Provider, FailureReason)]) -> String {
    failures
        .iter()
        .map(|(provider, reason)| format!("{provider}: {reason}"))
        .join(", ")
}

/// Errors generated while building configuration from the environment.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },

    #[error("invalid base url {0}: {1}")]
    BaseUrl(String, String),
}
