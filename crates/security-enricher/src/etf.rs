//! ETF holdings discovery.
//!
//! Holdings snapshots are replaced wholesale per ETF. Constituents get a
//! placeholder securities row before their holding row lands, and a
//! run-scoped dedup set guarantees each ticker is fetched at most once per
//! backfill run no matter how many ETFs hold it.

use crate::Enricher;
use chrono::Utc;
use screener_core::{EtfHolding, ScreenerError};
use std::collections::HashSet;

/// Tally of one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub etfs_synced: usize,
    pub holdings_written: usize,
    pub constituents_enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Weights at or below 1.0 are decimal fractions and get scaled to percent.
fn normalize_percent(percent: f64) -> f64 {
    if percent <= 1.0 {
        percent * 100.0
    } else {
        percent
    }
}

impl Enricher {
    /// Fetch and persist the top holdings of one ETF. An ETF with no
    /// reported holdings is a no-op, not an error.
    pub async fn sync_holdings(&self, etf_ticker: &str) -> Result<Vec<EtfHolding>, ScreenerError> {
        let etf_ticker = etf_ticker.trim().to_uppercase();

        let raw = match self.market().fetch_top_holdings(&etf_ticker).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => {
                tracing::info!(etf = %etf_ticker, "no holdings reported");
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!(etf = %etf_ticker, error = %e, "holdings fetch failed");
                return Err(e);
            }
        };

        let source = self.market().name().to_string();
        let discovered_via = format!("etf_holding:{etf_ticker}");
        let now = Utc::now();

        let mut holdings = Vec::with_capacity(raw.len());
        for (idx, raw_holding) in raw.into_iter().enumerate() {
            let constituent = raw_holding.ticker.trim().to_uppercase();
            if constituent.is_empty() {
                continue;
            }
            // Placeholder row first so the holding has a security to point at
            self.store()
                .ensure_placeholder(&constituent, raw_holding.name.as_deref(), &discovered_via)
                .await?;

            holdings.push(EtfHolding {
                etf_ticker: etf_ticker.clone(),
                constituent_ticker: constituent,
                holding_percent: normalize_percent(raw_holding.percent),
                holding_rank: (idx + 1) as i64,
                source: Some(source.clone()),
                last_updated: Some(now),
            });
        }

        self.store().replace_holdings(&etf_ticker, &holdings).await?;
        tracing::info!(etf = %etf_ticker, count = holdings.len(), "holdings synced");
        Ok(holdings)
    }

    /// Enrich a list of ETFs, sync their holdings, then enrich every
    /// constituent. Each ticker is fetched at most once per run.
    pub async fn backfill_etfs(
        &self,
        etf_tickers: &[String],
        holdings_only: bool,
    ) -> BackfillReport {
        let mut report = BackfillReport::default();
        let mut fetched_this_run: HashSet<String> = HashSet::new();
        let mut constituents: HashSet<String> = HashSet::new();

        for etf in etf_tickers {
            let etf = etf.trim().to_uppercase();

            // A repeated ETF in the input costs nothing: neither its profile
            // nor its holdings are fetched again this run
            if !fetched_this_run.insert(etf.clone()) {
                continue;
            }

            match self.enrich(&etf).await {
                Ok(Some(_)) => {}
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(%etf, error = %e, "etf enrichment failed");
                    report.failed += 1;
                }
            }

            match self.sync_holdings(&etf).await {
                Ok(holdings) => {
                    report.etfs_synced += 1;
                    report.holdings_written += holdings.len();
                    constituents.extend(holdings.into_iter().map(|h| h.constituent_ticker));
                }
                Err(e) => {
                    tracing::warn!(%etf, error = %e, "holdings sync failed");
                    report.failed += 1;
                }
            }
        }

        if holdings_only {
            return report;
        }

        // Deterministic order across runs
        let mut ordered: Vec<String> = constituents.into_iter().collect();
        ordered.sort();

        for ticker in ordered {
            if !fetched_this_run.insert(ticker.clone()) {
                continue;
            }
            match self.enrich(&ticker).await {
                Ok(Some(_)) => report.constituents_enriched += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(%ticker, error = %e, "constituent enrichment failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
