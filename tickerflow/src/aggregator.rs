use crate::{
    cache::{CacheKey, CacheStore, FetchResult, LoadState},
    category::{Category, Provider, TickerKey},
    config::AggregatorConfig,
    error::{CategoryError, ConfigError, FailureReason},
    merge::{FilingMerger, FilingQuery},
    model::{CanonicalRecord, FilingRecord},
    normalise::normalise,
    provider::{
        AdapterResponse, FetchOptions, Outcome, ProviderConfig, SourceAdapter, fmp::FmpAdapter,
        uw::UnusualWhalesAdapter,
    },
    stats::{DerivedStats, compute_stats, implied_reference_price},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use futures::future::{BoxFuture, FutureExt, join_all};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, info, warn};

/// Categories requested by a [`SnapshotRequest`].
///
/// Serialised as the keyword `"all"` or a list of category identifiers.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum CategorySelection {
    #[default]
    All,
    Only(Vec<Category>),
}

impl CategorySelection {
    /// Requested categories, de-duplicated in [`Category::ALL`] order.
    pub fn resolve(&self) -> Vec<Category> {
        match self {
            CategorySelection::All => Category::ALL.to_vec(),
            CategorySelection::Only(categories) => Category::ALL
                .into_iter()
                .filter(|category| categories.contains(category))
                .collect(),
        }
    }
}

impl From<Category> for CategorySelection {
    fn from(category: Category) -> Self {
        Self::Only(vec![category])
    }
}

impl From<Vec<Category>> for CategorySelection {
    fn from(categories: Vec<Category>) -> Self {
        Self::Only(categories)
    }
}

impl From<&[Category]> for CategorySelection {
    fn from(categories: &[Category]) -> Self {
        Self::Only(categories.to_vec())
    }
}

impl<const N: usize> From<[Category; N]> for CategorySelection {
    fn from(categories: [Category; N]) -> Self {
        Self::Only(categories.to_vec())
    }
}

impl Serialize for CategorySelection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CategorySelection::All => serializer.serialize_str("all"),
            CategorySelection::Only(categories) => categories.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CategorySelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Keyword(String),
            List(Vec<Category>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Keyword(keyword) if keyword.eq_ignore_ascii_case("all") => {
                Ok(CategorySelection::All)
            }
            Repr::Keyword(keyword) => keyword
                .parse::<Category>()
                .map(CategorySelection::from)
                .map_err(serde::de::Error::custom),
            Repr::List(categories) => Ok(CategorySelection::Only(categories)),
        }
    }
}

/// Request for a [`Snapshot`] of one ticker.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SnapshotRequest {
    pub ticker: TickerKey,
    #[serde(default)]
    pub categories: CategorySelection,
    #[serde(default)]
    pub force_refresh: bool,
    /// Price used for value stats. Implied from dark-pool or options data when absent.
    #[serde(default)]
    pub reference_price: Option<f64>,
}

impl SnapshotRequest {
    pub fn new(ticker: impl Into<TickerKey>, categories: impl Into<CategorySelection>) -> Self {
        Self {
            ticker: ticker.into(),
            categories: categories.into(),
            force_refresh: false,
            reference_price: None,
        }
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn reference_price(mut self, price: f64) -> Self {
        self.reference_price = Some(price);
        self
    }
}

/// Per-category slice of a [`Snapshot`].
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct CategoryView {
    /// Cached records, possibly stale when `error` is set.
    pub data: Vec<CanonicalRecord>,
    /// True once the category has been fetched successfully at least once.
    pub loaded: bool,
    pub state: LoadState,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Everything known about a ticker across all [`Category`]s.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Snapshot {
    pub ticker: TickerKey,
    pub categories: BTreeMap<Category, CategoryView>,
    pub stats: DerivedStats,
}

impl Snapshot {
    pub fn category(&self, category: Category) -> Option<&CategoryView> {
        self.categories.get(&category)
    }

    /// Categories carrying an error marker.
    pub fn errors(&self) -> impl Iterator<Item = (Category, &str)> {
        self.categories
            .iter()
            .filter_map(|(category, view)| view.error.as_deref().map(|error| (*category, error)))
    }
}

/// Façade over adapters, normaliser, merger, stats and cache.
///
/// Cheap to clone; clones share the cache and anomaly counter.
#[derive(Clone)]
pub struct Aggregator {
    adapters: Arc<[Arc<dyn SourceAdapter>]>,
    cache: CacheStore,
    /// Institution filings keyed by CIK, apart from ticker entries.
    institutions: CacheStore,
    config: AggregatorConfig,
    merger: FilingMerger,
    anomalies: Arc<AtomicU64>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field(
                "adapters",
                &self
                    .adapters
                    .iter()
                    .map(|adapter| adapter.provider())
                    .collect::<Vec<_>>(),
            )
            .field("cache", &self.cache)
            .field("institutions", &self.institutions)
            .field("config", &self.config)
            .finish()
    }
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: AggregatorConfig) -> Self {
        Self {
            adapters: adapters.into(),
            cache: CacheStore::new(config.max_tickers),
            institutions: CacheStore::new(config.max_tickers),
            merger: FilingMerger::new(config.merge_policy),
            config,
            anomalies: Arc::default(),
        }
    }

    /// Build from the environment: [`AggregatorConfig::from_env`] plus one reqwest adapter per
    /// provider with credentials present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = AggregatorConfig::from_env()?;
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(2);

        for provider in [Provider::Fmp, Provider::UnusualWhales] {
            let provider_config = match ProviderConfig::from_env(provider) {
                Ok(provider_config) => provider_config.with_timeout(config.upstream_timeout),
                Err(ConfigError::Missing(variable)) => {
                    warn!(%provider, variable, "provider disabled, credentials not configured");
                    continue;
                }
                Err(error) => return Err(error),
            };

            info!(%provider, base_url = %provider_config.base_url, "provider enabled");
            let adapter: Arc<dyn SourceAdapter> = match provider {
                Provider::Fmp => Arc::new(FmpAdapter::new(provider_config)),
                Provider::UnusualWhales => Arc::new(UnusualWhalesAdapter::new(provider_config)),
            };
            adapters.push(adapter);
        }

        if adapters.is_empty() {
            return Err(ConfigError::Missing("FMP_API_KEY or UW_API_KEY"));
        }

        Ok(Self::new(adapters, config))
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Cache of [`Aggregator::institution_filings`], keyed by CIK.
    pub fn institution_cache(&self) -> &CacheStore {
        &self.institutions
    }

    /// Total normalisation anomalies observed since construction.
    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    /// Resolve every requested category in parallel and assemble a [`Snapshot`].
    ///
    /// Never fails as a whole: a failed category carries an error marker and keeps serving its
    /// stale data, if any. Stats cover every category of the ticker currently resolved in the
    /// cache, requested or not.
    pub async fn snapshot(&self, request: SnapshotRequest) -> Snapshot {
        let SnapshotRequest {
            ticker,
            categories,
            force_refresh,
            reference_price,
        } = request;
        let requested = categories.resolve();

        let mut errors: FnvHashMap<Category, CategoryError> = FnvHashMap::default();
        if ticker.is_empty() {
            errors.extend(
                requested
                    .iter()
                    .map(|category| (*category, CategoryError::EmptyTicker(*category))),
            );
        } else {
            debug!(%ticker, ?requested, force_refresh, "resolving snapshot");
            let results = join_all(
                requested
                    .iter()
                    .map(|category| self.load(&ticker, *category, force_refresh)),
            )
            .await;

            errors.extend(
                requested
                    .iter()
                    .zip(results)
                    .filter_map(|(category, result)| result.err().map(|error| (*category, error))),
            );
        }

        self.assemble(ticker, errors, reference_price)
    }

    /// Convenience over [`Aggregator::snapshot`].
    pub async fn get_snapshot(
        &self,
        ticker: impl Into<TickerKey>,
        categories: impl Into<CategorySelection>,
        force_refresh: bool,
    ) -> Snapshot {
        self.snapshot(SnapshotRequest::new(ticker, categories).force_refresh(force_refresh))
            .await
    }

    /// Drop one cached category, forcing the next request to re-fetch it.
    pub fn invalidate(&self, ticker: &TickerKey, category: Category) -> bool {
        self.cache.invalidate(&CacheKey::new(ticker.clone(), category))
    }

    pub fn invalidate_ticker(&self, ticker: &TickerKey) -> bool {
        self.cache.invalidate_ticker(ticker)
    }

    pub fn state(&self, ticker: &TickerKey, category: Category) -> LoadState {
        self.cache.state(&CacheKey::new(ticker.clone(), category))
    }

    /// Run a [`FilingQuery`] over the merged filings of a ticker, fetching them if needed.
    ///
    /// Stale filings are served when a refresh fails.
    pub async fn filings(
        &self,
        ticker: &TickerKey,
        query: &FilingQuery,
    ) -> Result<Vec<FilingRecord>, CategoryError> {
        if ticker.is_empty() {
            return Err(CategoryError::EmptyTicker(Category::Filings));
        }

        let key = CacheKey::new(ticker.clone(), Category::Filings);
        let records = self
            .cache
            .get_or_fetch(
                &key,
                || self.fetch(ticker.clone(), Category::Filings, None),
                self.config.ttl(Category::Filings),
                false,
            )
            .await;

        Self::query_filings(&self.cache, &key, records, query)
    }

    /// Merged filings reported by one institution, keyed by CIK.
    pub async fn institution_filings(
        &self,
        cik: &str,
        force_refresh: bool,
    ) -> Result<Vec<FilingRecord>, CategoryError> {
        let entity = TickerKey::new(cik);
        if entity.is_empty() {
            return Err(CategoryError::EmptyTicker(Category::Filings));
        }

        let key = CacheKey::new(entity.clone(), Category::Filings);
        let lookup_key = Some(SmolStr::new(entity.as_str()));
        let records = self
            .institutions
            .get_or_fetch(
                &key,
                || self.fetch(entity, Category::Filings, lookup_key),
                self.config.ttl(Category::Filings),
                force_refresh,
            )
            .await;

        Self::query_filings(&self.institutions, &key, records, &FilingQuery::default())
    }

    fn query_filings(
        cache: &CacheStore,
        key: &CacheKey,
        records: FetchResult,
        query: &FilingQuery,
    ) -> Result<Vec<FilingRecord>, CategoryError> {
        let records = match records {
            Ok(records) => records,
            Err(error) => match cache.get(key) {
                Some(stale) => {
                    debug!(%key, %error, "serving stale filings");
                    stale.payload
                }
                None => return Err(error),
            },
        };

        let filings = records
            .iter()
            .cloned()
            .map(FilingRecord::from_record)
            .collect::<Vec<_>>();

        Ok(query.apply(&filings))
    }

    async fn load(
        &self,
        ticker: &TickerKey,
        category: Category,
        force_refresh: bool,
    ) -> Result<(), CategoryError> {
        let key = CacheKey::new(ticker.clone(), category);
        self.cache
            .get_or_fetch(
                &key,
                || self.fetch(ticker.clone(), category, None),
                self.config.ttl(category),
                force_refresh,
            )
            .await
            .map(|_| ())
    }

    /// Fan out to every adapter serving the category, normalise, and merge filings.
    ///
    /// Fails only when no adapter serves the category or every adapter failed.
    fn fetch(
        &self,
        entity: TickerKey,
        category: Category,
        lookup_key: Option<SmolStr>,
    ) -> BoxFuture<'static, FetchResult> {
        let adapters = self
            .adapters
            .iter()
            .filter(|adapter| adapter.supports(category))
            .cloned()
            .collect::<Vec<_>>();
        let options = FetchOptions {
            limit: self.config.result_limit,
            lookup_key,
        };
        let timeout = self.config.upstream_timeout;
        let merger = self.merger;
        let anomalies = Arc::clone(&self.anomalies);

        async move {
            if adapters.is_empty() {
                warn!(%entity, %category, "no configured provider serves category");
                return Err(CategoryError::NoProvider(category));
            }

            let responses = join_all(adapters.iter().map(|adapter| {
                let (entity, options) = (&entity, &options);
                async move {
                    let provider = adapter.provider();
                    let response = tokio::time::timeout(
                        timeout,
                        adapter.fetch(entity.as_str(), category, options),
                    )
                    .await
                    .unwrap_or_else(|_| AdapterResponse::failed(FailureReason::Timeout));
                    (provider, response)
                }
            }))
            .await;

            let mut records = Vec::new();
            let mut failures = Vec::new();
            let mut anomaly_count = 0;

            for (provider, response) in responses {
                match response.outcome {
                    Outcome::Failed(reason) => {
                        debug!(%entity, %category, %provider, %reason, "provider fetch failed");
                        failures.push((provider, reason));
                    }
                    Outcome::Ok | Outcome::Empty => {
                        let normalised = normalise(category, provider, response.records);
                        anomaly_count += normalised.anomalies;
                        records.extend(normalised.records);
                    }
                }
            }

            anomalies.fetch_add(anomaly_count as u64, Ordering::Relaxed);

            if failures.len() == adapters.len() {
                let error = CategoryError::AllProvidersFailed { category, failures };
                warn!(%entity, %category, %error, "category fetch failed");
                return Err(error);
            }

            if !failures.is_empty() {
                warn!(
                    %entity,
                    %category,
                    failed = ?failures.iter().map(|(provider, _)| *provider).collect::<Vec<_>>(),
                    "serving partial provider data"
                );
            }

            if category == Category::Filings {
                records = merger
                    .merge(records)
                    .into_iter()
                    .map(FilingRecord::into_record)
                    .collect();
            }

            debug!(
                %entity,
                %category,
                records = records.len(),
                anomalies = anomaly_count,
                "category fetched"
            );
            Ok(Arc::<[CanonicalRecord]>::from(records))
        }
        .boxed()
    }

    fn assemble(
        &self,
        ticker: TickerKey,
        mut errors: FnvHashMap<Category, CategoryError>,
        reference_price: Option<f64>,
    ) -> Snapshot {
        let categories = Category::ALL
            .into_iter()
            .map(|category| {
                let key = CacheKey::new(ticker.clone(), category);
                let entry = self.cache.get(&key);
                let error = errors
                    .remove(&category)
                    .or_else(|| self.cache.last_error(&key));

                let view = CategoryView {
                    data: entry
                        .as_ref()
                        .map(|entry| entry.payload.to_vec())
                        .unwrap_or_default(),
                    loaded: entry.is_some(),
                    state: self.cache.state(&key),
                    error: error.map(|error| error.to_string()),
                    fetched_at: entry.map(|entry| entry.fetched_at_utc),
                };

                (category, view)
            })
            .collect();

        let resolved = self.cache.resolved(&ticker);
        let slices = || {
            resolved
                .iter()
                .map(|(category, records)| (*category, &records[..]))
        };
        let reference_price = reference_price
            .or_else(|| implied_reference_price(slices()))
            .unwrap_or_default();
        let stats = compute_stats(slices(), reference_price);

        Snapshot {
            ticker,
            categories,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_selection_de() {
        struct TestCase {
            input: &'static str,
            expected: Result<CategorySelection, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: keyword
                input: r#""all""#,
                expected: Ok(CategorySelection::All),
            },
            TestCase {
                // TC1: list of wire identifiers
                input: r#"["dark_pool", "options"]"#,
                expected: Ok(CategorySelection::Only(vec![
                    Category::DarkPool,
                    Category::Options,
                ])),
            },
            TestCase {
                // TC2: single identifier, camel case accepted
                input: r#""hedgeFunds""#,
                expected: Ok(CategorySelection::Only(vec![Category::HedgeFunds])),
            },
            TestCase {
                // TC3: unknown identifier
                input: r#""quotes""#,
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<CategorySelection>(test.input).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_category_selection_resolve_dedups_in_canonical_order() {
        let selection = CategorySelection::from(vec![
            Category::Filings,
            Category::Ownership,
            Category::Filings,
        ]);
        assert_eq!(
            selection.resolve(),
            vec![Category::Ownership, Category::Filings]
        );
        assert_eq!(CategorySelection::All.resolve().len(), 8);
    }

    #[test]
    fn test_snapshot_request_defaults() {
        let request: SnapshotRequest = serde_json::from_str(r#"{ "ticker": " nvda " }"#).unwrap();

        assert_eq!(request, SnapshotRequest::new("NVDA", CategorySelection::All));
        assert!(!request.force_refresh);
        assert!(request.reference_price.is_none());
    }

    #[tokio::test]
    async fn test_empty_ticker_marks_requested_categories() {
        let aggregator = Aggregator::new(vec![], AggregatorConfig::default());

        let snapshot = aggregator.get_snapshot("  ", Category::Options, false).await;

        let errors = snapshot.errors().collect::<Vec<_>>();
        assert_eq!(errors, vec![(Category::Options, "empty ticker requested for options")]);
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_category_without_provider_is_error() {
        let aggregator = Aggregator::new(vec![], AggregatorConfig::default());

        let snapshot = aggregator.get_snapshot("AAPL", Category::DarkPool, false).await;

        let view = snapshot.category(Category::DarkPool).unwrap();
        assert_eq!(view.state, LoadState::Failed);
        assert!(!view.loaded);
        assert_eq!(
            view.error.as_deref(),
            Some("no configured provider serves category: dark_pool")
        );
        assert_eq!(snapshot.categories.len(), 8);
        assert_eq!(snapshot.stats, DerivedStats::default());
    }
}
