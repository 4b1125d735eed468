//! screener: enrich securities, sync ETF holdings, and rank tickers against
//! an investment thesis.
//!
//! Usage:
//!   cargo run -p screener-cli -- enrich --tickers NVDA VRT ETN
//!   cargo run -p screener-cli -- backfill-etfs --etfs QQQ SMH --holdings-only
//!   cargo run -p screener-cli -- analyze --thesis thesis.json --tickers NVDA AMD --top 5
//!
//! Providers are optional: without POLYGON_API_KEY / ALPHA_VANTAGE_API_KEY the
//! secondary enrichment passes are skipped.

use alignment_scorer::AlignmentScorer;
use alpha_vantage_client::AlphaVantageClient;
use polygon_client::PolygonClient;
use screener_core::Thesis;
use security_enricher::Enricher;
use security_store::SecurityStore;
use std::sync::Arc;
use yahoo_client::YahooClient;

const DEFAULT_DB: &str = "securities.db";
const DEFAULT_TOP: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screener=info,security_enricher=info,security_store=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        Some(cmd) if !cmd.starts_with("--") => cmd.to_string(),
        _ => usage(),
    };

    let db_path = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or(DEFAULT_DB);

    let store = SecurityStore::new(&format!("sqlite:{db_path}?mode=rwc")).await?;
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(store.pool())
        .await?;

    let yahoo = Arc::new(YahooClient::new());
    let mut enricher = Enricher::new(store.clone(), yahoo.clone());

    match std::env::var("POLYGON_API_KEY") {
        Ok(key) => enricher = enricher.with_reference(Arc::new(PolygonClient::new(key))),
        Err(_) => tracing::warn!("POLYGON_API_KEY not set, reference enrichment disabled"),
    }
    match std::env::var("ALPHA_VANTAGE_API_KEY") {
        Ok(key) => enricher = enricher.with_fundamentals(Arc::new(AlphaVantageClient::new(key))),
        Err(_) => tracing::warn!("ALPHA_VANTAGE_API_KEY not set, fundamentals enrichment disabled"),
    }

    match command.as_str() {
        "enrich" => cmd_enrich(&enricher, &args).await,
        "backfill-etfs" => cmd_backfill(&enricher, &args).await,
        "analyze" => cmd_analyze(&enricher, &store, &args).await,
        "stats" => cmd_stats(&store).await,
        other => {
            eprintln!("Unknown command: {other}");
            usage()
        }
    }
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  screener enrich --tickers T1 T2 ...          Enrich securities");
    eprintln!("  screener backfill-etfs --etfs E1 E2 ...      Sync ETF holdings + constituents");
    eprintln!("  screener analyze --thesis FILE --tickers ..  Score tickers against a thesis");
    eprintln!("  screener stats                               Row counts per table");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db PATH          SQLite DB path (default: {DEFAULT_DB})");
    eprintln!("  --holdings-only    backfill-etfs: skip constituent enrichment");
    eprintln!("  --top N            analyze: rows to print (default: {DEFAULT_TOP})");
    std::process::exit(1);
}

fn list_after(args: &[String], flag: &str) -> Vec<String> {
    args.iter()
        .position(|a| a == flag)
        .map(|idx| {
            args[idx + 1..]
                .iter()
                .take_while(|a| !a.starts_with("--"))
                .map(|t| t.trim().to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

async fn cmd_enrich(enricher: &Enricher, args: &[String]) -> anyhow::Result<()> {
    let tickers = list_after(args, "--tickers");
    if tickers.is_empty() {
        eprintln!("enrich: --tickers is required");
        usage();
    }

    let report = enricher.enrich_all(&tickers).await;
    println!(
        "Enriched {} | cache hits {} | skipped {} | failed {}",
        report.enriched, report.cache_hits, report.skipped, report.failed
    );
    Ok(())
}

async fn cmd_backfill(enricher: &Enricher, args: &[String]) -> anyhow::Result<()> {
    let etfs = list_after(args, "--etfs");
    if etfs.is_empty() {
        eprintln!("backfill-etfs: --etfs is required");
        usage();
    }
    let holdings_only = args.iter().any(|a| a == "--holdings-only");

    let report = enricher.backfill_etfs(&etfs, holdings_only).await;
    println!(
        "ETFs synced {} | holdings {} | constituents enriched {} | skipped {} | failed {}",
        report.etfs_synced,
        report.holdings_written,
        report.constituents_enriched,
        report.skipped,
        report.failed
    );
    Ok(())
}

async fn cmd_stats(store: &SecurityStore) -> anyhow::Result<()> {
    let stats = store.stats().await?;
    println!("securities         {}", stats.securities);
    println!("etf holdings       {}", stats.holdings);
    println!("thesis alignments  {}", stats.alignments);
    Ok(())
}

async fn cmd_analyze(
    enricher: &Enricher,
    store: &SecurityStore,
    args: &[String],
) -> anyhow::Result<()> {
    let thesis_path = args
        .iter()
        .position(|a| a == "--thesis")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| {
            eprintln!("analyze: --thesis FILE is required");
            usage();
        });
    let tickers = list_after(args, "--tickers");
    if tickers.is_empty() {
        eprintln!("analyze: --tickers is required");
        usage();
    }
    let top: usize = args
        .iter()
        .position(|a| a == "--top")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TOP);

    let thesis: Thesis = serde_json::from_str(&std::fs::read_to_string(&thesis_path)?)?;
    tracing::info!(thesis = %thesis.id, title = %thesis.title, tickers = tickers.len(), "analyzing");

    let scorer = AlignmentScorer::new();
    let market = enricher.market().clone();

    for ticker in &tickers {
        let (security, fetched) = match enricher.enrich_with_history(ticker).await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                tracing::warn!(%ticker, "no data, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "enrichment failed, skipping");
                continue;
            }
        };

        // Only a cache hit needs a history fetch; fresh enrichment already has it
        let history = match fetched {
            Some(h) => (!h.is_empty()).then_some(h),
            None => match market.fetch_history(ticker).await {
                Ok(h) if !h.is_empty() => Some(h),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(%ticker, error = %e, "history unavailable for momentum");
                    None
                }
            },
        };
        let dividends = match market.fetch_dividends(ticker).await {
            Ok(divs) => divs,
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "dividends unavailable");
                None
            }
        };

        let alignment = scorer.score(&security, &thesis, history.as_deref(), dividends.as_ref());
        store.upsert_alignment(&alignment).await?;
    }

    let rows = store.alignments_for_thesis(&thesis.id).await?;
    println!();
    println!("Thesis: {} ({})", thesis.title, thesis.id);
    println!("{:<8} {:>6}  RATIONALE", "TICKER", "SCORE");
    for row in rows.iter().take(top) {
        println!("{:<8} {:>6.2}  {}", row.ticker, row.score, row.rationale);
    }
    Ok(())
}
