use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Canonical fused security record, keyed by uppercase ticker
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Security {
    pub ticker: String,
    pub name: Option<String>,
    /// One of "stock", "etf", "fund", "unknown"
    pub asset_type: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    /// Absolute units, never millions
    pub market_cap: Option<f64>,
    pub gics_sector: Option<String>,
    pub gics_industry: Option<String>,
    pub asset_class: Option<String>,
    /// Derived: gics_sector when present, else asset_class
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub current_price: Option<f64>,
    pub pe_ratio: Option<f64>,
    /// Percentage scale (2.5 means 2.5%)
    pub dividend_yield_pct: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
    pub return_1y: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_ytd: Option<f64>,
    pub avg_volume: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub discovered_via: Option<String>,
    pub discovered_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Security {
    pub fn new(ticker: &str) -> Self {
        Security {
            ticker: ticker.trim().to_uppercase(),
            ..Default::default()
        }
    }

    /// A record counts as populated only when it carries live market data,
    /// not just descriptive fields.
    pub fn has_market_data(&self) -> bool {
        self.current_price.is_some()
            || self.return_1y.is_some()
            || self.return_3m.is_some()
            || self.return_1m.is_some()
    }

    /// Classification fields that secondary providers exist to fill.
    pub fn needs_classification(&self) -> bool {
        self.sector.is_none() || self.description.is_none()
    }
}

/// Partial security shape every provider normalizes its response into.
/// Field names mirror `Security`; merge is fill-only-null per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityPatch {
    pub name: Option<String>,
    pub asset_type: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub gics_sector: Option<String>,
    pub gics_industry: Option<String>,
    pub asset_class: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub current_price: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield_pct: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
    pub return_1y: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_ytd: Option<f64>,
    pub avg_volume: Option<f64>,
    pub expense_ratio: Option<f64>,
}

/// Daily closing price
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// A single dividend payment
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DividendPayment {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Dividend payment history, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DividendHistory {
    pub payments: Vec<DividendPayment>,
}

/// A constituent line as reported by the fund holdings endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHolding {
    pub ticker: String,
    pub name: Option<String>,
    /// May arrive as a decimal fraction (0.072) or a percentage (7.2)
    pub percent: f64,
}

/// Persisted ETF constituent row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EtfHolding {
    pub etf_ticker: String,
    pub constituent_ticker: String,
    /// 0-100 scale
    pub holding_percent: f64,
    /// 1-based, contiguous per ETF
    pub holding_rank: i64,
    pub source: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Scored (thesis, security) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThesisAlignment {
    pub thesis_id: String,
    pub ticker: String,
    /// 0-10 scale, 2 decimal places
    pub score: f64,
    pub rationale: String,
    pub exposure_factors: Vec<String>,
    pub revenue_exposure_pct: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Free-text investment thesis loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Thesis {
    /// Lowercased concatenation of title, summary and keywords used by
    /// every text-matching factor.
    pub fn full_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.summary);
        for kw in &self.keywords {
            text.push(' ');
            text.push_str(kw);
        }
        text.to_lowercase()
    }
}
