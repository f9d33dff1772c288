use super::{
    AdapterResponse, FetchOptions, ProviderConfig, SourceAdapter, endpoint_url, get_records,
};
use crate::{
    category::{Category, Provider},
    error::FailureReason,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// [`FmpAdapter`] default base url.
///
/// See docs: <https://site.financialmodelingprep.com/developer/docs>
pub const BASE_URL_FMP: &str = "https://financialmodelingprep.com/";

/// Financial Modeling Prep REST adapter.
///
/// Authenticates with the `apikey` query parameter.
#[derive(Clone, Debug)]
pub struct FmpAdapter {
    client: Client,
    config: ProviderConfig,
}

impl FmpAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Resolve the endpoint & query parameters for a category.
    fn endpoint(
        &self,
        ticker: &str,
        category: Category,
        options: &FetchOptions,
    ) -> Result<(Url, Vec<(&'static str, String)>), FailureReason> {
        let limit = options.limit.to_string();
        let (path, query): (Vec<&str>, _) = match category {
            Category::Ownership => (vec!["api", "v3", "institutional-holder", ticker], vec![]),
            Category::Insiders => (
                vec!["api", "v4", "insider-trading"],
                vec![("symbol", ticker.to_string()), ("limit", limit)],
            ),
            Category::Congress => (
                vec!["api", "v4", "senate-trading"],
                vec![("symbol", ticker.to_string())],
            ),
            Category::Filings => match options.lookup_key.as_deref() {
                Some(cik) => (vec!["api", "v3", "form-thirteen", cik], vec![]),
                None => (
                    vec![
                        "api",
                        "v4",
                        "institutional-ownership",
                        "institutional-holders",
                        "symbol-ownership-percent",
                    ],
                    vec![("symbol", ticker.to_string()), ("page", "0".to_string())],
                ),
            },
            Category::Activity
            | Category::HedgeFunds
            | Category::Options
            | Category::DarkPool => return Err(FailureReason::Unsupported),
        };

        let url = endpoint_url(&self.config.base_url, &path)?;
        Ok((url, query))
    }
}

#[async_trait]
impl SourceAdapter for FmpAdapter {
    fn provider(&self) -> Provider {
        Provider::Fmp
    }

    fn supports(&self, category: Category) -> bool {
        matches!(
            category,
            Category::Ownership | Category::Insiders | Category::Congress | Category::Filings
        )
    }

    async fn fetch(
        &self,
        entity_key: &str,
        category: Category,
        options: &FetchOptions,
    ) -> AdapterResponse {
        let (url, query) = match self.endpoint(entity_key, category, options) {
            Ok(endpoint) => endpoint,
            Err(reason) => return AdapterResponse::failed(reason),
        };

        debug!(provider = %Provider::Fmp, %category, path = url.path(), "fetching");

        let request = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .query(&query)
            .query(&[("apikey", self.config.api_key.expose())]);

        let mut response = get_records(request, Provider::Fmp, category).await;
        response.records.truncate(options.limit);
        response
    }
}
