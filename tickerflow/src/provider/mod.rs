use crate::{
    category::{Category, Provider},
    error::{ConfigError, FailureReason},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Financial Modeling Prep adapter.
pub mod fmp;

/// Unusual Whales adapter.
pub mod uw;

/// Opaque provider-native record, as returned by one adapter for one [`Category`].
pub type RawProviderRecord = Value;

/// Default upstream request timeout.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of records requested from an upstream.
pub const DEFAULT_RESULT_LIMIT: usize = 500;

/// Per-call options passed to a [`SourceAdapter`].
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct FetchOptions {
    /// Maximum number of records requested from the upstream.
    pub limit: usize,
    /// Institution CIK. When set, filings are fetched for the institution instead of the
    /// ticker.
    pub lookup_key: Option<SmolStr>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RESULT_LIMIT,
            lookup_key: None,
        }
    }
}

/// Outcome of one [`SourceAdapter::fetch`] call.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum Outcome {
    Ok,
    Empty,
    Failed(FailureReason),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Provider-native records plus the [`Outcome`] of the call that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    pub records: Vec<RawProviderRecord>,
    pub outcome: Outcome,
}

impl AdapterResponse {
    /// Construct a response from extracted records, classifying empty payloads.
    pub fn from_records(records: Vec<RawProviderRecord>) -> Self {
        let outcome = if records.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Ok
        };
        Self { records, outcome }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            records: Vec::new(),
            outcome: Outcome::Failed(reason),
        }
    }
}

/// Contract every upstream provider integration satisfies.
///
/// Implementations are stateless with respect to the request, safely callable concurrently,
/// and never fail across the boundary: every failure is reported as [`Outcome::Failed`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn supports(&self, category: Category) -> bool;

    async fn fetch(
        &self,
        entity_key: &str,
        category: Category,
        options: &FetchOptions,
    ) -> AdapterResponse;
}

/// Extract the record list from any of the response shapes providers use interchangeably.
///
/// Accepts a bare array, `{ "data": [...] }`, `{ "data": {...} }`, or a bare object. Array
/// elements that are not objects are dropped.
pub fn extract_records(response: Value) -> Vec<RawProviderRecord> {
    match response {
        Value::Array(items) => items.into_iter().filter(Value::is_object).collect(),
        Value::Object(mut object) => match object.remove("data") {
            Some(data @ (Value::Array(_) | Value::Object(_))) => extract_records(data),
            Some(Value::Null) | None if !object.is_empty() => vec![Value::Object(object)],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Opaque upstream credential. Never rendered by `Debug` or `Display`.
#[derive(Clone, Eq, PartialEq, Deserialize)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Base settings for one provider, supplied by the bootstrap layer.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    pub base_url: Url,
    pub api_key: ApiKey,
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_UPSTREAM_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl ProviderConfig {
    pub fn new(base_url: Url, api_key: ApiKey) -> Self {
        Self {
            base_url,
            api_key,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from `FMP_API_KEY`/`FMP_BASE_URL` or `UW_API_KEY`/`UW_BASE_URL`.
    pub fn from_env(provider: Provider) -> Result<Self, ConfigError> {
        let (key_var, url_var, default_url) = match provider {
            Provider::Fmp => ("FMP_API_KEY", "FMP_BASE_URL", fmp::BASE_URL_FMP),
            Provider::UnusualWhales => ("UW_API_KEY", "UW_BASE_URL", uw::BASE_URL_UW),
        };

        let api_key = std::env::var(key_var).map_err(|_| ConfigError::Missing(key_var))?;
        let raw_url = std::env::var(url_var).unwrap_or_else(|_| default_url.to_string());

        Ok(Self::new(parse_base_url(&raw_url)?, ApiKey::new(api_key)))
    }
}

/// Parse a base url, ensuring a trailing slash so relative paths join beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalised = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&normalised)
        .map_err(|error| ConfigError::BaseUrl(raw.to_string(), error.to_string()))
}

/// Append `segments` to the path of `base`.
///
/// Each segment is percent-encoded (including `/`, `?` and `#`), so an entity key always stays
/// a single path segment of the intended endpoint. Blank and dot segments are rejected.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, FailureReason> {
    if let Some(segment) = segments
        .iter()
        .find(|segment| matches!(segment.trim(), "" | "." | ".."))
    {
        return Err(FailureReason::InvalidKey(segment.to_string()));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FailureReason::InvalidKey(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Issue a GET request and classify the response into an [`AdapterResponse`].
pub(crate) async fn get_records(
    request: reqwest::RequestBuilder,
    provider: Provider,
    category: Category,
) -> AdapterResponse {
    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => return AdapterResponse::failed(FailureReason::from(error)),
    };

    let status = response.status();
    if !status.is_success() {
        return AdapterResponse::failed(FailureReason::Status(status.as_u16()));
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error) => return AdapterResponse::failed(FailureReason::from(error)),
    };

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => {
            let records = extract_records(value);
            debug!(%provider, %category, records = records.len(), "upstream response decoded");
            AdapterResponse::from_records(records)
        }
        Err(error) => AdapterResponse::failed(FailureReason::Decode(error.to_string())),
    }
}
