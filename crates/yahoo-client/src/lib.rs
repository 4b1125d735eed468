use async_trait::async_trait;
use chrono::DateTime;
use rate_limiter::SlidingWindow;
use reqwest::Client;
use screener_core::{
    normalize, DividendHistory, DividendPayment, MarketDataProvider, PricePoint, ProviderResult,
    RawHolding, ScreenerError, SecurityPatch,
};
use serde_json::Value;
use std::time::Duration;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const PROVIDER: &str = "yahoo";

const QUOTE_SUMMARY_MODULES: &str =
    "price,summaryDetail,assetProfile,defaultKeyStatistics,fundProfile,topHoldings";

/// Yahoo caps fund holdings responses at the top 10 constituents.
const MAX_HOLDINGS: usize = 10;

/// Primary market-data client. No daily quota, but a gentle per-minute
/// throttle keeps us off Yahoo's radar.
pub struct YahooClient {
    client: Client,
    throttle: SlidingWindow,
    base_url: String,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    pub fn new() -> Self {
        let per_minute: usize = std::env::var("YAHOO_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; thesis-screener)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            throttle: SlidingWindow::new(per_minute, Duration::from_secs(60)),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ScreenerError> {
        self.throttle.acquire().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ScreenerError::Api {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            tracing::debug!(url, "yahoo returned 404");
            return Ok(Value::Null);
        }
        if !status.is_success() {
            return Err(ScreenerError::Api {
                provider: PROVIDER,
                message: format!("HTTP {}", status),
            });
        }

        response.json().await.map_err(|e| ScreenerError::Parse {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }

    /// One quoteSummary result object, or `None` for unknown tickers.
    async fn quote_summary(&self, ticker: &str) -> ProviderResult<Value> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, ticker);
        let body = self
            .get_json(&url, &[("modules", QUOTE_SUMMARY_MODULES)])
            .await?;

        let result = body
            .pointer("/quoteSummary/result/0")
            .cloned()
            .unwrap_or(Value::Null);
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    /// One chart result object (daily closes with dividend events), or `None`.
    async fn chart(&self, ticker: &str, range: &str) -> ProviderResult<Value> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let body = self
            .get_json(
                &url,
                &[("range", range), ("interval", "1d"), ("events", "div")],
            )
            .await?;

        let result = body
            .pointer("/chart/result/0")
            .cloned()
            .unwrap_or(Value::Null);
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(result))
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_profile(&self, ticker: &str) -> ProviderResult<SecurityPatch> {
        Ok(self
            .quote_summary(ticker)
            .await?
            .map(|result| summary_to_patch(&result)))
    }

    async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>, ScreenerError> {
        match self.chart(ticker, "1y").await? {
            Some(result) => Ok(parse_history(&result)),
            None => Ok(Vec::new()),
        }
    }

    /// Two years of payments so dividend growth has a baseline to compare
    /// against.
    async fn fetch_dividends(&self, ticker: &str) -> ProviderResult<DividendHistory> {
        Ok(self
            .chart(ticker, "2y")
            .await?
            .map(|result| parse_dividends(&result)))
    }

    async fn fetch_top_holdings(&self, ticker: &str) -> ProviderResult<Vec<RawHolding>> {
        Ok(self
            .quote_summary(ticker)
            .await?
            .and_then(|result| parse_holdings(&result)))
    }
}

/// Yahoo wraps numerics as {"raw": 1.23, "fmt": "1.23"}.
fn raw_f64(value: &Value, pointer: &str) -> Option<f64> {
    value
        .pointer(pointer)
        .and_then(|v| v.get("raw").or(Some(v)))
        .and_then(Value::as_f64)
}

fn text(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn map_quote_type(quote_type: &str) -> String {
    match quote_type {
        "EQUITY" => "stock".to_string(),
        "ETF" => "etf".to_string(),
        "MUTUALFUND" => "fund".to_string(),
        _ => "unknown".to_string(),
    }
}

fn summary_to_patch(result: &Value) -> SecurityPatch {
    SecurityPatch {
        name: text(result, "/price/longName").or_else(|| text(result, "/price/shortName")),
        asset_type: text(result, "/price/quoteType")
            .as_deref()
            .map(map_quote_type),
        exchange: text(result, "/price/exchangeName")
            .as_deref()
            .and_then(normalize::code),
        currency: text(result, "/price/currency")
            .as_deref()
            .and_then(normalize::code),
        market_cap: raw_f64(result, "/price/marketCap").map(normalize::market_cap),
        gics_sector: text(result, "/assetProfile/sector"),
        industry: text(result, "/assetProfile/industry"),
        description: text(result, "/assetProfile/longBusinessSummary"),
        current_price: raw_f64(result, "/price/regularMarketPrice"),
        pe_ratio: raw_f64(result, "/summaryDetail/trailingPE"),
        // Yahoo yields are decimal fractions
        dividend_yield_pct: raw_f64(result, "/summaryDetail/dividendYield")
            .map(normalize::dividend_yield_pct),
        week52_high: raw_f64(result, "/summaryDetail/fiftyTwoWeekHigh"),
        week52_low: raw_f64(result, "/summaryDetail/fiftyTwoWeekLow"),
        avg_volume: raw_f64(result, "/summaryDetail/averageVolume"),
        expense_ratio: raw_f64(
            result,
            "/fundProfile/feesExpensesInvestment/annualReportExpenseRatio",
        )
        .map(normalize::dividend_yield_pct),
        ..Default::default()
    }
}

fn parse_history(result: &Value) -> Vec<PricePoint> {
    let timestamps = match result.pointer("/timestamp").and_then(Value::as_array) {
        Some(ts) => ts,
        None => return Vec::new(),
    };
    let closes = match result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
    {
        Some(c) => c,
        None => return Vec::new(),
    };

    timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let secs = ts.as_i64()?;
            let close = close.as_f64()?;
            let date = DateTime::from_timestamp(secs, 0)?.date_naive();
            Some(PricePoint { date, close })
        })
        .collect()
}

fn parse_dividends(result: &Value) -> DividendHistory {
    let mut payments: Vec<DividendPayment> = result
        .pointer("/events/dividends")
        .and_then(Value::as_object)
        .map(|divs| {
            divs.values()
                .filter_map(|d| {
                    let secs = d.get("date").and_then(Value::as_i64)?;
                    let amount = d.get("amount").and_then(Value::as_f64)?;
                    let date = DateTime::from_timestamp(secs, 0)?.date_naive();
                    Some(DividendPayment { date, amount })
                })
                .collect()
        })
        .unwrap_or_default();

    payments.sort_by_key(|p| p.date);
    DividendHistory { payments }
}

fn parse_holdings(result: &Value) -> Option<Vec<RawHolding>> {
    let holdings = result
        .pointer("/topHoldings/holdings")
        .and_then(Value::as_array)?;

    let parsed: Vec<RawHolding> = holdings
        .iter()
        .take(MAX_HOLDINGS)
        .filter_map(|h| {
            let ticker = h.get("symbol").and_then(Value::as_str)?;
            let percent = raw_f64(h, "/holdingPercent")?;
            Some(RawHolding {
                ticker: ticker.trim().to_uppercase(),
                name: h
                    .get("holdingName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                percent,
            })
        })
        .collect();

    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_patch_pulls_raw_wrapped_numbers() {
        let result = json!({
            "price": {
                "longName": "Vertiv Holdings Co",
                "quoteType": "EQUITY",
                "exchangeName": "NYSE",
                "currency": "usd",
                "regularMarketPrice": {"raw": 95.4, "fmt": "95.40"},
                "marketCap": {"raw": 3.6e10, "fmt": "36B"}
            },
            "summaryDetail": {
                "trailingPE": {"raw": 68.2},
                "dividendYield": {"raw": 0.001},
                "fiftyTwoWeekHigh": {"raw": 155.84},
                "fiftyTwoWeekLow": {"raw": 53.6},
                "averageVolume": {"raw": 9_500_000.0}
            },
            "assetProfile": {
                "sector": "Industrials",
                "industry": "Electrical Equipment & Parts",
                "longBusinessSummary": "Provides datacenter cooling and power infrastructure."
            }
        });
        let patch = summary_to_patch(&result);
        assert_eq!(patch.name.as_deref(), Some("Vertiv Holdings Co"));
        assert_eq!(patch.asset_type.as_deref(), Some("stock"));
        assert_eq!(patch.currency.as_deref(), Some("USD"));
        assert_eq!(patch.current_price, Some(95.4));
        assert_eq!(patch.gics_sector.as_deref(), Some("Industrials"));
        assert!((patch.dividend_yield_pct.unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(patch.week52_high, Some(155.84));
    }

    #[test]
    fn test_history_skips_null_closes() {
        let result = json!({
            "timestamp": [1696118400, 1696204800, 1696291200],
            "indicators": {"quote": [{"close": [420.0, null, 431.5]}]}
        });
        let points = parse_history(&result);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].close, 420.0);
        assert_eq!(points[1].close, 431.5);
    }

    #[test]
    fn test_dividends_sorted_oldest_first() {
        let result = json!({
            "events": {"dividends": {
                "1719446400": {"amount": 0.47, "date": 1719446400},
                "1711584000": {"amount": 0.45, "date": 1711584000}
            }}
        });
        let history = parse_dividends(&result);
        assert_eq!(history.payments.len(), 2);
        assert!(history.payments[0].date < history.payments[1].date);
        assert_eq!(history.payments[0].amount, 0.45);
    }

    #[test]
    fn test_holdings_capped_and_uppercased() {
        let holdings: Vec<Value> = (0..12)
            .map(|i| {
                json!({
                    "symbol": format!("t{i}"),
                    "holdingName": format!("Company {i}"),
                    "holdingPercent": {"raw": 0.05}
                })
            })
            .collect();
        let result = json!({"topHoldings": {"holdings": holdings}});

        let parsed = parse_holdings(&result).unwrap();
        assert_eq!(parsed.len(), 10);
        assert_eq!(parsed[0].ticker, "T0");
    }

    #[test]
    fn test_missing_topholdings_is_none() {
        let result = json!({"price": {"longName": "Plain Stock"}});
        assert!(parse_holdings(&result).is_none());
    }
}
