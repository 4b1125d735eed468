use async_trait::async_trait;
use rate_limiter::ProviderLimiter;
use reqwest::Client;
use screener_core::{
    normalize, FundamentalsProvider, ProviderResult, ScreenerError, SecurityPatch,
};
use serde_json::Value;
use std::time::Duration;

const BASE_URL: &str = "https://www.alphavantage.co";
const PROVIDER: &str = "alpha_vantage";

/// Fundamentals client for the Alpha Vantage free tier (5 calls/min, 25/day).
///
/// Alpha Vantage reports throttling in-band: a 200 response whose body is an
/// empty object or carries a "Note"/"Information" key instead of data.
pub struct AlphaVantageClient {
    api_key: String,
    client: Client,
    limiter: ProviderLimiter,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        let per_minute: usize = std::env::var("ALPHA_VANTAGE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let per_day: u32 = std::env::var("ALPHA_VANTAGE_DAILY_LIMIT")
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

    /// Fetch the OVERVIEW payload. `Ok(None)` when Alpha Vantage has no data
    /// for the symbol.
    pub async fn get_company_overview(&self, ticker: &str) -> ProviderResult<Value> {
        self.limiter.admit().await?;

        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", "OVERVIEW"),
                ("symbol", ticker),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ScreenerError::Api {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ScreenerError::Api {
                provider: PROVIDER,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| ScreenerError::Parse {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        if let Some(note) = body.get("Note").or_else(|| body.get("Information")) {
            return Err(ScreenerError::Api {
                provider: PROVIDER,
                message: note.as_str().unwrap_or("throttled").to_string(),
            });
        }

        // Unknown symbols come back as an empty object
        if body.get("Symbol").and_then(Value::as_str).is_none() {
            return Ok(None);
        }

        Ok(Some(body))
    }
}

#[async_trait]
impl FundamentalsProvider for AlphaVantageClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_overview(&self, ticker: &str) -> ProviderResult<SecurityPatch> {
        Ok(self
            .get_company_overview(ticker)
            .await?
            .map(|body| overview_to_patch(&body)))
    }
}

fn overview_to_patch(body: &Value) -> SecurityPatch {
    SecurityPatch {
        name: text_field(body, "Name"),
        exchange: text_field(body, "Exchange")
            .as_deref()
            .and_then(normalize::code),
        currency: text_field(body, "Currency")
            .as_deref()
            .and_then(normalize::code),
        gics_sector: text_field(body, "Sector"),
        industry: text_field(body, "Industry"),
        description: text_field(body, "Description"),
        market_cap: num_field(body, "MarketCapitalization").map(normalize::market_cap),
        pe_ratio: num_field(body, "PERatio"),
        // Alpha Vantage yields are decimal fractions
        dividend_yield_pct: num_field(body, "DividendYield").map(normalize::dividend_yield_pct),
        week52_high: num_field(body, "52WeekHigh"),
        week52_low: num_field(body, "52WeekLow"),
        ..Default::default()
    }
}

/// Alpha Vantage encodes missing values as "None", "-" or "".
fn text_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None" && *s != "-")
        .map(str::to_string)
}

/// Numeric fields arrive as strings.
fn num_field(body: &Value, key: &str) -> Option<f64> {
    text_field(body, key).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overview_patch_normalizes_yield_and_market_cap() {
        let body = json!({
            "Symbol": "KO",
            "Name": "Coca-Cola Co",
            "Exchange": "nyse",
            "Currency": "usd",
            "Sector": "Consumer Staples",
            "Industry": "Beverages",
            "Description": "Beverage company.",
            "MarketCapitalization": "265000000000",
            "PERatio": "24.1",
            "DividendYield": "0.031",
            "52WeekHigh": "65.2",
            "52WeekLow": "51.6"
        });
        let patch = overview_to_patch(&body);
        assert_eq!(patch.gics_sector.as_deref(), Some("Consumer Staples"));
        assert_eq!(patch.exchange.as_deref(), Some("NYSE"));
        assert!((patch.dividend_yield_pct.unwrap() - 3.1).abs() < 1e-9);
        assert!((patch.market_cap.unwrap() - 2.65e11).abs() < 1.0);
        assert_eq!(patch.pe_ratio, Some(24.1));
    }

    #[test]
    fn test_none_strings_treated_as_missing() {
        let body = json!({
            "Symbol": "XYZ",
            "Name": "Xyz Corp",
            "Sector": "None",
            "DividendYield": "None",
            "MarketCapitalization": "-"
        });
        let patch = overview_to_patch(&body);
        assert!(patch.gics_sector.is_none());
        assert!(patch.dividend_yield_pct.is_none());
        assert!(patch.market_cap.is_none());
    }
}
