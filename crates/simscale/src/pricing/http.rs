use crate::common::config::PricingConfig;
use crate::common::error::SimScaleError;
use crate::pricing::table::PriceTable;
use crate::pricing::{PriceFuture, PriceLookup, PricePoint, PriceQuery};

/// The price source rejects requests without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0";

/// Reads VM prices from the HTML price table published by the price site.
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(config: &PricingConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                SimScaleError::PricingUnavailable(format!("Cannot create HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn table_url(&self, query: &PriceQuery) -> String {
        format!(
            "{}?region={}&tier={}",
            self.base_url,
            query.region,
            query.priority.tier()
        )
    }

    async fn fetch_table(&self, url: &str) -> crate::Result<PriceTable> {
        log::debug!("Fetching price table from {url}");
        let response = self.client.get(url).send().await.map_err(|e| {
            SimScaleError::PricingUnavailable(format!("Request to {url} failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SimScaleError::PricingUnavailable(format!(
                "Price source {url} responded with status {}",
                status.as_u16()
            )));
        }
        let body = response.text().await.map_err(|e| {
            SimScaleError::PricingUnavailable(format!("Cannot read price page {url}: {e}"))
        })?;
        PriceTable::parse_html(&body)
    }
}

impl PriceLookup for HttpPriceSource {
    fn lookup(&self, query: PriceQuery) -> PriceFuture<'_> {
        Box::pin(async move {
            let url = self.table_url(&query);
            let table = self.fetch_table(&url).await?;
            let price = table.find_price(&query.vm_sku, query.host_os)?;
            log::debug!(
                "Price of {} ({}, {}) in {}: {price}",
                query.vm_sku,
                query.priority,
                query.host_os,
                query.region
            );
            Ok(PricePoint::new(query, price))
        })
    }
}
