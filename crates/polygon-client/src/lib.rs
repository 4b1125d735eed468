use async_trait::async_trait;
use rate_limiter::ProviderLimiter;
use reqwest::Client;
use screener_core::{
    normalize, ProviderResult, ReferenceDataProvider, ScreenerError, SecurityPatch,
};
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.polygon.io";
const PROVIDER: &str = "polygon";

/// Reference-data client for the Polygon free tier (5 calls/min, 25/day).
pub struct PolygonClient {
    api_key: String,
    client: Client,
    limiter: ProviderLimiter,
    base_url: String,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Free tier defaults; paid plans can raise these via env.
        let per_minute: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let per_day: u32 = std::env::var("POLYGON_DAILY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(25);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            limiter: ProviderLimiter::new(PROVIDER, per_minute, per_day),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a request through the limiter with automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ScreenerError> {
        let request = builder.build().map_err(|e| ScreenerError::Api {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        for attempt in 0..3u32 {
            self.limiter.admit().await?;
            let req_clone = request.try_clone().ok_or_else(|| ScreenerError::Api {
                provider: PROVIDER,
                message: "cannot clone request".to_string(),
            })?;
            let response =
                self.client
                    .execute(req_clone)
                    .await
                    .map_err(|e| ScreenerError::Api {
                        provider: PROVIDER,
                        message: e.to_string(),
                    })?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "Polygon 429 rate limited, waiting {}s before retry {}/3",
                wait_secs,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(ScreenerError::Api {
            provider: PROVIDER,
            message: "rate limited after 3 retries".to_string(),
        })
    }

    /// Get ticker reference details. `Ok(None)` when Polygon does not know
    /// the ticker.
    pub async fn get_ticker_details(
        &self,
        ticker: &str,
    ) -> Result<Option<TickerDetails>, ScreenerError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, ticker);

        let response = self
            .send_request(self.client.get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScreenerError::Api {
                provider: PROVIDER,
                message: format!(
                    "HTTP {}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        let details: TickerDetailsResponse =
            response.json().await.map_err(|e| ScreenerError::Parse {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        Ok(Some(details.results))
    }
}

#[async_trait]
impl ReferenceDataProvider for PolygonClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_reference(&self, ticker: &str) -> ProviderResult<SecurityPatch> {
        Ok(self.get_ticker_details(ticker).await?.map(details_to_patch))
    }
}

fn details_to_patch(details: TickerDetails) -> SecurityPatch {
    SecurityPatch {
        name: Some(details.name).filter(|n| !n.is_empty()),
        asset_type: details.ticker_type.as_deref().map(map_ticker_type),
        exchange: details
            .primary_exchange
            .as_deref()
            .and_then(normalize::code),
        currency: details.currency_name.as_deref().and_then(normalize::code),
        market_cap: details.market_cap.map(normalize::market_cap),
        // Polygon has no GICS taxonomy; the SIC description is the
        // classification fallback so a derived sector still materializes
        gics_sector: details.sic_description.clone(),
        industry: details.sic_description.clone(),
        description: details.description,
        ..Default::default()
    }
}

fn map_ticker_type(ticker_type: &str) -> String {
    match ticker_type {
        "CS" | "ADRC" | "PFD" => "stock".to_string(),
        "ETF" | "ETN" | "ETV" => "etf".to_string(),
        "FUND" => "fund".to_string(),
        _ => "unknown".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ticker_type: Option<String>,
    pub primary_exchange: Option<String>,
    pub currency_name: Option<String>,
    pub market_cap: Option<f64>,
    pub description: Option<String>,
    pub sic_description: Option<String>,
}
