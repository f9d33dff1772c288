use crate::{
    cache::DEFAULT_MAX_TICKERS,
    category::{Category, Provider},
    error::ConfigError,
    merge::MergePolicy,
    provider::{DEFAULT_RESULT_LIMIT, DEFAULT_UPSTREAM_TIMEOUT},
};
use serde::{Deserialize, Deserializer};
use std::{collections::BTreeMap, str::FromStr, time::Duration};

/// TTL applied to categories without an override.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// [`Aggregator`](crate::aggregator::Aggregator) tuning.
///
/// Quarterly 13F data changes slowly and is cached for an hour, options flow & dark-pool prints
/// for a minute, and everything else for [`DEFAULT_TTL`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    #[serde(deserialize_with = "de_duration_secs")]
    pub default_ttl: Duration,
    #[serde(deserialize_with = "de_ttl_overrides")]
    pub ttl_overrides: BTreeMap<Category, Duration>,
    #[serde(deserialize_with = "de_duration_secs")]
    pub upstream_timeout: Duration,
    pub max_tickers: usize,
    pub result_limit: usize,
    pub merge_policy: MergePolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let hour = Duration::from_secs(60 * 60);
        let minute = Duration::from_secs(60);

        Self {
            default_ttl: DEFAULT_TTL,
            ttl_overrides: BTreeMap::from([
                (Category::Ownership, hour),
                (Category::HedgeFunds, hour),
                (Category::Filings, hour),
                (Category::Options, minute),
                (Category::DarkPool, minute),
            ]),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            max_tickers: DEFAULT_MAX_TICKERS,
            result_limit: DEFAULT_RESULT_LIMIT,
            merge_policy: MergePolicy::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn ttl(&self, category: Category) -> Duration {
        self.ttl_overrides
            .get(&category)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn with_ttl(mut self, category: Category, ttl: Duration) -> Self {
        self.ttl_overrides.insert(category, ttl);
        self
    }

    /// Apply one TTL to every category.
    pub fn with_uniform_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self.ttl_overrides.clear();
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_max_tickers(mut self, max_tickers: usize) -> Self {
        self.max_tickers = max_tickers;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Build from `TICKERFLOW_*` environment variables, defaulting anything unset.
    ///
    /// | Variable                            | Meaning                              |
    /// |-------------------------------------|--------------------------------------|
    /// | `TICKERFLOW_TTL_SECS`               | TTL for every category               |
    /// | `TICKERFLOW_TTL_<CATEGORY>_SECS`    | Per-category TTL, e.g. `..._DARK_POOL_SECS` |
    /// | `TICKERFLOW_UPSTREAM_TIMEOUT_SECS`  | Per-adapter request timeout          |
    /// | `TICKERFLOW_MAX_TICKERS`            | Resident ticker bound                |
    /// | `TICKERFLOW_RESULT_LIMIT`           | Records requested per upstream call  |
    /// | `TICKERFLOW_PRIORITY`               | Preferred provider, `fmp` or `uw`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. See [`AggregatorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "TICKERFLOW_TTL_SECS")? {
            config = config.with_uniform_ttl(Duration::from_secs(secs));
        }

        for category in Category::ALL {
            let name = format!("TICKERFLOW_TTL_{}_SECS", category.as_str().to_uppercase());
            if let Some(secs) = parse_var::<u64, _>(&lookup, &name)? {
                config.ttl_overrides.insert(category, Duration::from_secs(secs));
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "TICKERFLOW_UPSTREAM_TIMEOUT_SECS")? {
            config.upstream_timeout = Duration::from_secs(secs);
        }

        if let Some(max_tickers) = parse_var(&lookup, "TICKERFLOW_MAX_TICKERS")? {
            config.max_tickers = max_tickers;
        }

        if let Some(limit) = parse_var(&lookup, "TICKERFLOW_RESULT_LIMIT")? {
            config.result_limit = limit;
        }

        if let Some(provider) = parse_var::<Provider, _>(&lookup, "TICKERFLOW_PRIORITY")? {
            config.merge_policy = MergePolicy::preferring(provider);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value,
        })
}

fn de_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn de_ttl_overrides<'de, D>(deserializer: D) -> Result<BTreeMap<Category, Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<Category, u64>::deserialize(deserializer).map(|overrides| {
        overrides
            .into_iter()
            .map(|(category, secs)| (category, Duration::from_secs(secs)))
            .collect()
    })
}
