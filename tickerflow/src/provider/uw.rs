use super::{
    AdapterResponse, FetchOptions, ProviderConfig, SourceAdapter, endpoint_url, get_records,
};
use crate::{
    category::{Category, Provider},
    error::FailureReason,
};
use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::debug;
use url::Url;

/// [`UnusualWhalesAdapter`] default base url.
///
/// See docs: <https://api.unusualwhales.com/docs>
pub const BASE_URL_UW: &str = "https://api.unusualwhales.com/";

/// Unusual Whales REST adapter.
///
/// Authenticates with a `Bearer` authorization header. Serves every [`Category`].
#[derive(Clone, Debug)]
pub struct UnusualWhalesAdapter {
    client: Client,
    config: ProviderConfig,
}

impl UnusualWhalesAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(
        &self,
        ticker: &str,
        category: Category,
        options: &FetchOptions,
    ) -> Result<(Url, Vec<(&'static str, String)>), FailureReason> {
        let limit = ("limit", options.limit.to_string());
        let (path, query): (Vec<&str>, _) = match category {
            Category::Ownership => (vec!["api", "stock", ticker, "ownership"], vec![limit]),
            Category::Activity => (
                vec!["api", "stock", ticker, "institution-activity"],
                vec![limit],
            ),
            Category::HedgeFunds => (
                vec!["api", "stock", ticker, "ownership"],
                vec![limit, ("tags", "hedge_fund".to_string())],
            ),
            Category::Insiders => (
                vec!["api", "stock", ticker, "insider-buy-sells"],
                vec![limit],
            ),
            Category::Congress => (
                vec!["api", "congress", "recent-trades"],
                vec![limit, ("ticker", ticker.to_string())],
            ),
            Category::Options => (vec!["api", "stock", ticker, "flow-recent"], vec![limit]),
            Category::DarkPool => (vec!["api", "darkpool", ticker], vec![limit]),
            Category::Filings => match options.lookup_key.as_deref() {
                Some(cik) => (vec!["api", "institution", cik, "filings"], vec![limit]),
                None => (
                    vec!["api", "stock", ticker, "institution-filings"],
                    vec![limit],
                ),
            },
        };

        let url = endpoint_url(&self.config.base_url, &path)?;
        Ok((url, query))
    }
}

#[async_trait]
impl SourceAdapter for UnusualWhalesAdapter {
    fn provider(&self) -> Provider {
        Provider::UnusualWhales
    }

    fn supports(&self, _: Category) -> bool {
        true
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

        debug!(provider = %Provider::UnusualWhales, %category, path = url.path(), "fetching");

        let request = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(self.config.api_key.expose())
            .query(&query);

        let mut response = get_records(request, Provider::UnusualWhales, category).await;
        response.records.truncate(options.limit);
        response
    }
}
