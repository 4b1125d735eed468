use chrono::{Duration, Utc};
use screener_core::{normalize, EtfHolding, ScreenerError, Security, ThesisAlignment};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

/// Price and performance fields older than this are treated as missing.
/// Descriptive fields (sector, description) never expire.
pub const FRESHNESS_DAYS: i64 = 7;

const SELECT_SECURITY: &str = "SELECT ticker, name, asset_type, exchange, currency, market_cap, \
     gics_sector, gics_industry, asset_class, sector, industry, description, \
     current_price, pe_ratio, dividend_yield_pct, week52_high, week52_low, \
     return_1y, return_3m, return_1m, return_ytd, avg_volume, expense_ratio, \
     discovered_via, discovered_date, last_updated \
     FROM securities WHERE ticker = ?";

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub securities: i64,
    pub holdings: i64,
    pub alignments: i64,
}

#[derive(Clone)]
pub struct SecurityStore {
    pool: SqlitePool,
}

impl SecurityStore {
    pub async fn new(database_url: &str) -> Result<Self, ScreenerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(ScreenerError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ScreenerError> {
        let schema = include_str!("../schema.sql");

        // sqlx executes one statement at a time
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read a record regardless of age. Used to recover descriptive fields
    /// that never expire.
    pub async fn read_any(&self, ticker: &str) -> Result<Option<Security>, ScreenerError> {
        let ticker = ticker.trim().to_uppercase();
        let row = sqlx::query_as::<_, Security>(SELECT_SECURITY)
            .bind(&ticker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Cache read: the row must be recent enough and actually carry market
    /// data. A stale or price-less row is a miss, not an error.
    pub async fn read_fresh(&self, ticker: &str) -> Result<Option<Security>, ScreenerError> {
        let Some(security) = self.read_any(ticker).await? else {
            return Ok(None);
        };

        let cutoff = Utc::now() - Duration::days(FRESHNESS_DAYS);
        let fresh = security
            .last_updated
            .map(|updated| updated > cutoff)
            .unwrap_or(false);

        if fresh && security.has_market_data() {
            Ok(Some(security))
        } else {
            Ok(None)
        }
    }

    /// Normalize and write a record, preserving the original discovery
    /// provenance across updates.
    pub async fn upsert_security(&self, security: &Security) -> Result<(), ScreenerError> {
        let mut sec = security.clone();
        normalize::apply(&mut sec);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO securities (ticker, name, asset_type, exchange, currency, market_cap, \
                 gics_sector, gics_industry, asset_class, sector, industry, description, \
                 current_price, pe_ratio, dividend_yield_pct, week52_high, week52_low, \
                 return_1y, return_3m, return_1m, return_ytd, avg_volume, expense_ratio, \
                 discovered_via, discovered_date, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(ticker) DO UPDATE SET \
                 name = excluded.name, \
                 asset_type = excluded.asset_type, \
                 exchange = excluded.exchange, \
                 currency = excluded.currency, \
                 market_cap = excluded.market_cap, \
                 gics_sector = excluded.gics_sector, \
                 gics_industry = excluded.gics_industry, \
                 asset_class = excluded.asset_class, \
                 sector = excluded.sector, \
                 industry = excluded.industry, \
                 description = excluded.description, \
                 current_price = excluded.current_price, \
                 pe_ratio = excluded.pe_ratio, \
                 dividend_yield_pct = excluded.dividend_yield_pct, \
                 week52_high = excluded.week52_high, \
                 week52_low = excluded.week52_low, \
                 return_1y = excluded.return_1y, \
                 return_3m = excluded.return_3m, \
                 return_1m = excluded.return_1m, \
                 return_ytd = excluded.return_ytd, \
                 avg_volume = excluded.avg_volume, \
                 expense_ratio = excluded.expense_ratio, \
                 discovered_via = COALESCE(securities.discovered_via, excluded.discovered_via), \
                 discovered_date = COALESCE(securities.discovered_date, excluded.discovered_date), \
                 last_updated = excluded.last_updated",
        )
        .bind(&sec.ticker)
        .bind(&sec.name)
        .bind(&sec.asset_type)
        .bind(&sec.exchange)
        .bind(&sec.currency)
        .bind(sec.market_cap)
        .bind(&sec.gics_sector)
        .bind(&sec.gics_industry)
        .bind(&sec.asset_class)
        .bind(&sec.sector)
        .bind(&sec.industry)
        .bind(&sec.description)
        .bind(sec.current_price)
        .bind(sec.pe_ratio)
        .bind(sec.dividend_yield_pct)
        .bind(sec.week52_high)
        .bind(sec.week52_low)
        .bind(sec.return_1y)
        .bind(sec.return_3m)
        .bind(sec.return_1m)
        .bind(sec.return_ytd)
        .bind(sec.avg_volume)
        .bind(sec.expense_ratio)
        .bind(&sec.discovered_via)
        .bind(sec.discovered_date.unwrap_or(now))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Minimal row so holdings can reference a constituent before it has
    /// been enriched. No-op when the ticker already exists.
    pub async fn ensure_placeholder(
        &self,
        ticker: &str,
        name: Option<&str>,
        discovered_via: &str,
    ) -> Result<(), ScreenerError> {
        let ticker = ticker.trim().to_uppercase();
        sqlx::query(
            "INSERT OR IGNORE INTO securities (ticker, name, discovered_via, discovered_date) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&ticker)
        .bind(name)
        .bind(discovered_via)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the full holdings snapshot for one ETF in one transaction.
    pub async fn replace_holdings(
        &self,
        etf_ticker: &str,
        holdings: &[EtfHolding],
    ) -> Result<(), ScreenerError> {
        let etf_ticker = etf_ticker.trim().to_uppercase();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM etf_holdings WHERE etf_ticker = ?")
            .bind(&etf_ticker)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for holding in holdings {
            sqlx::query(
                "INSERT INTO etf_holdings (etf_ticker, constituent_ticker, holding_percent, \
                     holding_rank, source, last_updated) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&etf_ticker)
            .bind(&holding.constituent_ticker)
            .bind(holding.holding_percent)
            .bind(holding.holding_rank)
            .bind(&holding.source)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(etf = %etf_ticker, count = holdings.len(), "holdings replaced");
        Ok(())
    }

    pub async fn constituents_of(
        &self,
        etf_ticker: &str,
    ) -> Result<Vec<EtfHolding>, ScreenerError> {
        let rows = sqlx::query_as::<_, EtfHolding>(
            "SELECT etf_ticker, constituent_ticker, holding_percent, holding_rank, source, \
                 last_updated \
             FROM etf_holdings WHERE etf_ticker = ? ORDER BY holding_rank",
        )
        .bind(etf_ticker.trim().to_uppercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_alignment(
        &self,
        alignment: &ThesisAlignment,
    ) -> Result<(), ScreenerError> {
        let factors = serde_json::to_string(&alignment.exposure_factors)
            .map_err(|e| ScreenerError::InvalidData(e.to_string()))?;

        sqlx::query(
            "INSERT INTO thesis_alignments (thesis_id, ticker, score, rationale, \
                 exposure_factors, revenue_exposure_pct, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(thesis_id, ticker) DO UPDATE SET \
                 score = excluded.score, \
                 rationale = excluded.rationale, \
                 exposure_factors = excluded.exposure_factors, \
                 revenue_exposure_pct = excluded.revenue_exposure_pct, \
                 last_updated = excluded.last_updated",
        )
        .bind(&alignment.thesis_id)
        .bind(alignment.ticker.trim().to_uppercase())
        .bind(alignment.score)
        .bind(&alignment.rationale)
        .bind(factors)
        .bind(alignment.revenue_exposure_pct)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Alignments for one thesis, best score first.
    pub async fn alignments_for_thesis(
        &self,
        thesis_id: &str,
    ) -> Result<Vec<ThesisAlignment>, ScreenerError> {
        let rows = sqlx::query_as::<_, AlignmentRow>(
            "SELECT thesis_id, ticker, score, rationale, exposure_factors, \
                 revenue_exposure_pct, last_updated \
             FROM thesis_alignments WHERE thesis_id = ? ORDER BY score DESC, ticker",
        )
        .bind(thesis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AlignmentRow::into_alignment).collect())
    }

    pub async fn stats(&self) -> Result<StoreStats, ScreenerError> {
        let securities: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM securities")
            .fetch_one(&self.pool)
            .await?;
        let holdings: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM etf_holdings")
            .fetch_one(&self.pool)
            .await?;
        let alignments: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM thesis_alignments")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            securities: securities.0,
            holdings: holdings.0,
            alignments: alignments.0,
        })
    }
}

#[derive(FromRow)]
struct AlignmentRow {
    thesis_id: String,
    ticker: String,
    score: f64,
    rationale: Option<String>,
    exposure_factors: Option<String>,
    revenue_exposure_pct: Option<f64>,
    last_updated: Option<chrono::DateTime<Utc>>,
}

impl AlignmentRow {
    fn into_alignment(self) -> ThesisAlignment {
        ThesisAlignment {
            thesis_id: self.thesis_id,
            ticker: self.ticker,
            score: self.score,
            rationale: self.rationale.unwrap_or_default(),
            exposure_factors: self
                .exposure_factors
                .as_deref()
                .and_then(|f| serde_json::from_str(f).ok())
                .unwrap_or_default(),
            revenue_exposure_pct: self.revenue_exposure_pct,
            last_updated: self.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SecurityStore {
        SecurityStore::new("sqlite::memory:").await.unwrap()
    }

    fn priced_security(ticker: &str) -> Security {
        let mut sec = Security::new(ticker);
        sec.name = Some(format!("{ticker} Corp"));
        sec.current_price = Some(100.0);
        sec.dividend_yield_pct = Some(2.5);
        sec.gics_sector = Some("Information Technology".to_string());
        sec
    }

    #[tokio::test]
    async fn test_upsert_then_read_fresh_roundtrip() {
        let store = test_store().await;
        store.upsert_security(&priced_security("nvda")).await.unwrap();

        let sec = store.read_fresh("NVDA").await.unwrap().unwrap();
        assert_eq!(sec.ticker, "NVDA");
        assert_eq!(sec.current_price, Some(100.0));
        assert_eq!(sec.dividend_yield_pct, Some(2.5));
        assert_eq!(sec.sector.as_deref(), Some("Information Technology"));
        assert!(sec.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_read_fresh_misses_stale_rows_but_read_any_hits() {
        let store = test_store().await;
        store.upsert_security(&priced_security("AAPL")).await.unwrap();

        let old = Utc::now() - Duration::days(FRESHNESS_DAYS + 3);
        sqlx::query("UPDATE securities SET last_updated = ? WHERE ticker = 'AAPL'")
            .bind(old)
            .execute(store.pool())
            .await
            .unwrap();

        assert!(store.read_fresh("AAPL").await.unwrap().is_none());
        let any = store.read_any("AAPL").await.unwrap().unwrap();
        assert_eq!(any.sector.as_deref(), Some("Information Technology"));
    }

    #[tokio::test]
    async fn test_read_fresh_misses_rows_without_market_data() {
        let store = test_store().await;
        let mut sec = Security::new("DESC");
        sec.description = Some("All prose, no prices".to_string());
        store.upsert_security(&sec).await.unwrap();

        // Recent but price-less: the cache must not serve it
        assert!(store.read_fresh("DESC").await.unwrap().is_none());
        assert!(store.read_any("DESC").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_placeholder_never_overwrites_existing_row() {
        let store = test_store().await;
        store.upsert_security(&priced_security("MSFT")).await.unwrap();
        store
            .ensure_placeholder("MSFT", Some("Wrong Name"), "etf_holding:QQQ")
            .await
            .unwrap();

        let sec = store.read_any("MSFT").await.unwrap().unwrap();
        assert_eq!(sec.name.as_deref(), Some("MSFT Corp"));
    }

    #[tokio::test]
    async fn test_replace_holdings_is_wholesale() {
        let store = test_store().await;
        let make = |c: &str, rank: i64| EtfHolding {
            etf_ticker: "QQQ".to_string(),
            constituent_ticker: c.to_string(),
            holding_percent: 5.0,
            holding_rank: rank,
            source: Some("yahoo".to_string()),
            last_updated: None,
        };

        store
            .replace_holdings("QQQ", &[make("AAPL", 1), make("MSFT", 2)])
            .await
            .unwrap();
        store
            .replace_holdings("QQQ", &[make("NVDA", 1)])
            .await
            .unwrap();

        let holdings = store.constituents_of("QQQ").await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].constituent_ticker, "NVDA");
        assert!(holdings[0].last_updated.is_some());
    }

    #[tokio::test]
    async fn test_alignment_upsert_last_write_wins() {
        let store = test_store().await;
        let mut alignment = ThesisAlignment {
            thesis_id: "t1".to_string(),
            ticker: "NVDA".to_string(),
            score: 6.43,
            rationale: "first pass".to_string(),
            exposure_factors: vec!["theme keywords".to_string()],
            revenue_exposure_pct: Some(85.0),
            last_updated: None,
        };
        store.upsert_alignment(&alignment).await.unwrap();

        alignment.score = 8.57;
        alignment.rationale = "second pass".to_string();
        store.upsert_alignment(&alignment).await.unwrap();

        let rows = store.alignments_for_thesis("t1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 8.57);
        assert_eq!(rows[0].rationale, "second pass");
        assert_eq!(rows[0].exposure_factors, vec!["theme keywords"]);
    }

    #[tokio::test]
    async fn test_stats_counts_all_tables() {
        let store = test_store().await;
        store.upsert_security(&priced_security("A")).await.unwrap();
        store.upsert_security(&priced_security("B")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.securities, 2);
        assert_eq!(stats.holdings, 0);
        assert_eq!(stats.alignments, 0);
    }
}
