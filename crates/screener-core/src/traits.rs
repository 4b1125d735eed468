use async_trait::async_trait;

use crate::{DividendHistory, PricePoint, RawHolding, ScreenerError, SecurityPatch};

/// `Ok(None)` means the provider answered but has no data for the ticker;
/// `Err` is reserved for transport, parse and quota failures.
pub type ProviderResult<T> = Result<Option<T>, ScreenerError>;

/// Primary market-data source: quotes, history, dividends, fund holdings
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_profile(&self, ticker: &str) -> ProviderResult<SecurityPatch>;

    /// One year of daily closes, oldest first
    async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>, ScreenerError>;

    async fn fetch_dividends(&self, ticker: &str) -> ProviderResult<DividendHistory>;

    /// Top constituents of a fund, largest weight first
    async fn fetch_top_holdings(&self, ticker: &str) -> ProviderResult<Vec<RawHolding>>;
}

/// Reference/classification source used to backfill descriptive fields
#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_reference(&self, ticker: &str) -> ProviderResult<SecurityPatch>;
}

/// Fundamentals source (sector, industry, valuation ratios)
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_overview(&self, ticker: &str) -> ProviderResult<SecurityPatch>;
}
