//! Multi-source security enrichment.
//!
//! One ticker at a time: check the staleness-aware cache, seed a record from
//! the market-data provider, recover descriptive fields already on disk, and
//! call the reference and fundamentals providers only when classification
//! gaps remain. Every fusion step is fill-only-null, so earlier sources win
//! per field.

pub mod etf;
pub mod merge;
pub mod returns;

use screener_core::{
    normalize, FundamentalsProvider, MarketDataProvider, PricePoint, ReferenceDataProvider,
    ScreenerError, Security, SecurityPatch,
};
use security_store::SecurityStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub enriched: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    CacheHit(Security),
    Enriched(Security, Vec<PricePoint>),
    NoData,
}

pub struct Enricher {
    store: SecurityStore,
    market: Arc<dyn MarketDataProvider>,
    reference: Option<Arc<dyn ReferenceDataProvider>>,
    fundamentals: Option<Arc<dyn FundamentalsProvider>>,
    // Set when a provider's daily quota runs out; stays set for the run
    reference_disabled: AtomicBool,
    fundamentals_disabled: AtomicBool,
}

impl Enricher {
    pub fn new(store: SecurityStore, market: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            store,
            market,
            reference: None,
            fundamentals: None,
            reference_disabled: AtomicBool::new(false),
            fundamentals_disabled: AtomicBool::new(false),
        }
    }

    pub fn with_reference(mut self, provider: Arc<dyn ReferenceDataProvider>) -> Self {
        self.reference = Some(provider);
        self
    }

    pub fn with_fundamentals(mut self, provider: Arc<dyn FundamentalsProvider>) -> Self {
        self.fundamentals = Some(provider);
        self
    }

    pub fn store(&self) -> &SecurityStore {
        &self.store
    }

    pub fn market(&self) -> &Arc<dyn MarketDataProvider> {
        &self.market
    }

    /// Enrich one ticker. `Ok(None)` means the primary provider had nothing;
    /// secondary-provider trouble degrades to unfilled fields instead of
    /// failing the ticker.
    pub async fn enrich(&self, ticker: &str) -> Result<Option<Security>, ScreenerError> {
        match self.enrich_outcome(ticker).await? {
            Outcome::CacheHit(sec) | Outcome::Enriched(sec, _) => Ok(Some(sec)),
            Outcome::NoData => Ok(None),
        }
    }

    /// Like [`enrich`](Self::enrich), but hands back the daily closes a fresh
    /// enrichment already fetched so callers scoring momentum don't fetch the
    /// same history twice. A cache hit carries no history.
    pub async fn enrich_with_history(
        &self,
        ticker: &str,
    ) -> Result<Option<(Security, Option<Vec<PricePoint>>)>, ScreenerError> {
        match self.enrich_outcome(ticker).await? {
            Outcome::CacheHit(sec) => Ok(Some((sec, None))),
            Outcome::Enriched(sec, history) => Ok(Some((sec, Some(history)))),
            Outcome::NoData => Ok(None),
        }
    }

    async fn enrich_outcome(&self, ticker: &str) -> Result<Outcome, ScreenerError> {
        let ticker = ticker.trim().to_uppercase();

        if let Some(cached) = self.store.read_fresh(&ticker).await? {
            tracing::debug!(%ticker, "cache hit, skipping fetch");
            return Ok(Outcome::CacheHit(cached));
        }

        let profile = match self.market.fetch_profile(&ticker).await {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                tracing::info!(%ticker, provider = self.market.name(), "no data for ticker");
                return Ok(Outcome::NoData);
            }
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "market data fetch failed");
                return Ok(Outcome::NoData);
            }
        };

        let mut security = Security::new(&ticker);
        security.discovered_via = Some("direct".to_string());
        merge::fill_missing(&mut security, &profile);

        let history = match self.market.fetch_history(&ticker).await {
            Ok(history) => {
                if !history.is_empty() {
                    returns::apply(&mut security, &history);
                }
                history
            }
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "history fetch failed");
                Vec::new()
            }
        };

        // Descriptive fields already on disk never expire
        if let Some(existing) = self.store.read_any(&ticker).await? {
            merge::fill_missing(&mut security, &merge::descriptive_patch(&existing));
        }
        normalize::apply(&mut security);

        if security.needs_classification() {
            if let Some(patch) = self.reference_patch(&ticker).await {
                merge::fill_missing(&mut security, &patch);
                normalize::apply(&mut security);
            }
        }
        if security.needs_classification() {
            if let Some(patch) = self.fundamentals_patch(&ticker).await {
                merge::fill_missing(&mut security, &patch);
                normalize::apply(&mut security);
            }
        }

        self.store.upsert_security(&security).await?;
        tracing::info!(%ticker, sector = ?security.sector, "security enriched");
        Ok(Outcome::Enriched(security, history))
    }

    async fn reference_patch(&self, ticker: &str) -> Option<SecurityPatch> {
        let provider = self.reference.as_ref()?;
        if self.reference_disabled.load(Ordering::Relaxed) {
            return None;
        }
        match provider.fetch_reference(ticker).await {
            Ok(patch) => patch,
            Err(e) if e.is_quota_exhausted() => {
                tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "disabling reference provider for the rest of the run"
                );
                self.reference_disabled.store(true, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(%ticker, provider = provider.name(), error = %e, "reference fetch failed");
                None
            }
        }
    }

    async fn fundamentals_patch(&self, ticker: &str) -> Option<SecurityPatch> {
        let provider = self.fundamentals.as_ref()?;
        if self.fundamentals_disabled.load(Ordering::Relaxed) {
            return None;
        }
        match provider.fetch_overview(ticker).await {
            Ok(patch) => patch,
            Err(e) if e.is_quota_exhausted() => {
                tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "disabling fundamentals provider for the rest of the run"
                );
                self.fundamentals_disabled.store(true, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(%ticker, provider = provider.name(), error = %e, "fundamentals fetch failed");
                None
            }
        }
    }

    /// Process tickers in order; one ticker's failure never aborts the batch.
    pub async fn enrich_all(&self, tickers: &[String]) -> RunReport {
        let mut report = RunReport::default();

        for ticker in tickers {
            match self.enrich_outcome(ticker).await {
                Ok(Outcome::CacheHit(_)) => report.cache_hits += 1,
                Ok(Outcome::Enriched(..)) => report.enriched += 1,
                Ok(Outcome::NoData) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(%ticker, error = %e, "enrichment failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            enriched = report.enriched,
            cache_hits = report.cache_hits,
            skipped = report.skipped,
            failed = report.failed,
            "batch finished"
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use async_trait::async_trait;
    use screener_core::{
        DividendHistory, MarketDataProvider, PricePoint, ProviderResult, RawHolding,
        ReferenceDataProvider, ScreenerError, SecurityPatch,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockMarket {
        pub profiles: HashMap<String, SecurityPatch>,
        pub holdings: HashMap<String, Vec<RawHolding>>,
        pub history: HashMap<String, Vec<PricePoint>>,
        pub profile_calls: Mutex<Vec<String>>,
        pub holdings_calls: Mutex<Vec<String>>,
        pub history_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MarketDataProvider for MockMarket {
        fn name(&self) -> &'static str {
            "mock_market"
        }

        async fn fetch_profile(&self, ticker: &str) -> ProviderResult<SecurityPatch> {
            self.profile_calls.lock().unwrap().push(ticker.to_string());
            Ok(self.profiles.get(ticker).cloned())
        }

        async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>, ScreenerError> {
            self.history_calls.lock().unwrap().push(ticker.to_string());
            Ok(self.history.get(ticker).cloned().unwrap_or_default())
        }

        async fn fetch_dividends(&self, _ticker: &str) -> ProviderResult<DividendHistory> {
            Ok(None)
        }

        async fn fetch_top_holdings(&self, ticker: &str) -> ProviderResult<Vec<RawHolding>> {
            self.holdings_calls.lock().unwrap().push(ticker.to_string());
            Ok(self.holdings.get(ticker).cloned())
        }
    }

    pub enum MockReferenceMode {
        Patch(SecurityPatch),
        QuotaExhausted,
    }

    pub struct MockReference {
        pub mode: MockReferenceMode,
        pub calls: Mutex<usize>,
    }

    #[async_trait]
    impl ReferenceDataProvider for MockReference {
        fn name(&self) -> &'static str {
            "mock_reference"
        }

        async fn fetch_reference(&self, _ticker: &str) -> ProviderResult<SecurityPatch> {
            *self.calls.lock().unwrap() += 1;
            match &self.mode {
                MockReferenceMode::Patch(patch) => Ok(Some(patch.clone())),
                MockReferenceMode::QuotaExhausted => Err(ScreenerError::QuotaExhausted {
                    provider: "mock_reference",
                    resets_at: chrono::Utc::now(),
                }),
            }
        }
    }

    pub fn market_patch(name: &str, price: f64) -> SecurityPatch {
        SecurityPatch {
            name: Some(name.to_string()),
            current_price: Some(price),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use screener_core::SecurityPatch;
    use std::sync::Mutex;

    async fn store() -> SecurityStore {
        SecurityStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_network() {
        let store = store().await;
        let mut cached = Security::new("NVDA");
        cached.current_price = Some(900.0);
        store.upsert_security(&cached).await.unwrap();

        let market = Arc::new(MockMarket::default());
        let enricher = Enricher::new(store, market.clone());

        let sec = enricher.enrich("nvda").await.unwrap().unwrap();
        assert_eq!(sec.current_price, Some(900.0));
        assert!(market.profile_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_skipped_not_persisted() {
        let store = store().await;
        let enricher = Enricher::new(store.clone(), Arc::new(MockMarket::default()));

        assert!(enricher.enrich("ZZZZ").await.unwrap().is_none());
        assert!(store.read_any("ZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_secondary_called_only_for_classification_gaps() {
        let store = store().await;
        let mut market = MockMarket::default();
        // Fully classified by the primary: sector and description present
        market.profiles.insert(
            "AAPL".to_string(),
            SecurityPatch {
                name: Some("Apple Inc".to_string()),
                current_price: Some(180.0),
                gics_sector: Some("Information Technology".to_string()),
                description: Some("Makes phones.".to_string()),
                ..Default::default()
            },
        );
        market
            .profiles
            .insert("MYST".to_string(), market_patch("Mystery Co", 10.0));

        let reference = Arc::new(MockReference {
            mode: MockReferenceMode::Patch(SecurityPatch {
                gics_sector: Some("Industrials".to_string()),
                description: Some("Filled by reference.".to_string()),
                ..Default::default()
            }),
            calls: Mutex::new(0),
        });
        let enricher =
            Enricher::new(store, Arc::new(market)).with_reference(reference.clone());

        enricher.enrich("AAPL").await.unwrap().unwrap();
        assert_eq!(*reference.calls.lock().unwrap(), 0);

        let myst = enricher.enrich("MYST").await.unwrap().unwrap();
        assert_eq!(*reference.calls.lock().unwrap(), 1);
        assert_eq!(myst.sector.as_deref(), Some("Industrials"));
        assert_eq!(myst.description.as_deref(), Some("Filled by reference."));
        // Primary still owns the fields it provided
        assert_eq!(myst.name.as_deref(), Some("Mystery Co"));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_disables_provider_for_the_run() {
        let store = store().await;
        let mut market = MockMarket::default();
        market
            .profiles
            .insert("AA".to_string(), market_patch("Aa Corp", 1.0));
        market
            .profiles
            .insert("BB".to_string(), market_patch("Bb Corp", 2.0));

        let reference = Arc::new(MockReference {
            mode: MockReferenceMode::QuotaExhausted,
            calls: Mutex::new(0),
        });
        let enricher =
            Enricher::new(store, Arc::new(market)).with_reference(reference.clone());

        enricher.enrich("AA").await.unwrap();
        enricher.enrich("BB").await.unwrap();
        // Second ticker must not touch the exhausted provider
        assert_eq!(*reference.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stored_description_survives_refresh() {
        let store = store().await;
        let mut old = Security::new("VRT");
        old.description = Some("Datacenter cooling and power.".to_string());
        old.gics_sector = Some("Industrials".to_string());
        store.upsert_security(&old).await.unwrap();
        // Age the row past freshness so the enricher refetches
        let stale = chrono::Utc::now() - chrono::Duration::days(30);
        sqlx::query("UPDATE securities SET last_updated = ? WHERE ticker = 'VRT'")
            .bind(stale)
            .execute(store.pool())
            .await
            .unwrap();

        let mut market = MockMarket::default();
        market
            .profiles
            .insert("VRT".to_string(), market_patch("Vertiv Holdings", 95.0));
        let enricher = Enricher::new(store, Arc::new(market));

        let sec = enricher.enrich("VRT").await.unwrap().unwrap();
        assert_eq!(sec.current_price, Some(95.0));
        assert_eq!(sec.description.as_deref(), Some("Datacenter cooling and power."));
        assert_eq!(sec.sector.as_deref(), Some("Industrials"));
    }

    #[tokio::test]
    async fn test_enrich_with_history_hands_back_the_fetched_closes() {
        let store = store().await;
        let mut market = MockMarket::default();
        market
            .profiles
            .insert("VRT".to_string(), market_patch("Vertiv Holdings", 95.0));
        let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        market.history.insert(
            "VRT".to_string(),
            (0..5)
                .map(|i| PricePoint {
                    date: start + chrono::Duration::days(i),
                    close: 90.0 + i as f64,
                })
                .collect(),
        );

        let market = Arc::new(market);
        let enricher = Enricher::new(store, market.clone());

        let (sec, history) = enricher.enrich_with_history("VRT").await.unwrap().unwrap();
        assert_eq!(history.as_ref().map(Vec::len), Some(5));
        assert!(sec.return_1y.is_some());
        // One history fetch covered both returns and the handed-back closes
        assert_eq!(market.history_calls.lock().unwrap().len(), 1);

        // A cache hit carries no history (and fetches nothing)
        let (_, history) = enricher.enrich_with_history("VRT").await.unwrap().unwrap();
        assert!(history.is_none());
        assert_eq!(market.history_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enrich_all_tallies_outcomes() {
        let store = store().await;
        let mut fresh = Security::new("HIT");
        fresh.current_price = Some(5.0);
        store.upsert_security(&fresh).await.unwrap();

        let mut market = MockMarket::default();
        market
            .profiles
            .insert("NEW".to_string(), market_patch("New Corp", 7.0));
        let enricher = Enricher::new(store, Arc::new(market));

        let report = enricher
            .enrich_all(&[
                "HIT".to_string(),
                "NEW".to_string(),
                "GONE".to_string(),
            ])
            .await;

        assert_eq!(
            report,
            RunReport {
                enriched: 1,
                cache_hits: 1,
                skipped: 1,
                failed: 0
            }
        );
    }
}
