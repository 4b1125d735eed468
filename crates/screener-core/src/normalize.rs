//! Field normalization applied to every security before persistence.
//!
//! Providers disagree on units: dividend yields arrive as decimal fractions
//! or percentages, market caps in absolute dollars or millions. These rules
//! coerce everything onto one scale so downstream scoring never guesses.

use crate::Security;

/// Yields below this are assumed to be decimal fractions (0.025 = 2.5%).
/// No real security yields under 0.1% and over 10% as a fraction.
const YIELD_FRACTION_CUTOFF: f64 = 0.1;

/// Market caps below this are assumed to be quoted in millions.
const MARKET_CAP_MILLIONS_CUTOFF: f64 = 1_000_000.0;

/// Coerce a dividend yield onto the percentage scale.
pub fn dividend_yield_pct(value: f64) -> f64 {
    if value > 0.0 && value < YIELD_FRACTION_CUTOFF {
        value * 100.0
    } else {
        value
    }
}

/// Coerce a market cap onto absolute units.
pub fn market_cap(value: f64) -> f64 {
    if value > 0.0 && value < MARKET_CAP_MILLIONS_CUTOFF {
        value * MARKET_CAP_MILLIONS_CUTOFF
    } else {
        value
    }
}

/// Trimmed uppercase, `None` when the result would be empty.
pub fn code(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Effective sector: GICS when present, asset class otherwise.
pub fn derived_sector(gics_sector: Option<&str>, asset_class: Option<&str>) -> Option<String> {
    gics_sector
        .filter(|s| !s.trim().is_empty())
        .or(asset_class.filter(|s| !s.trim().is_empty()))
        .map(|s| s.trim().to_string())
}

/// Apply every normalization rule in place. Idempotent.
pub fn apply(security: &mut Security) {
    security.ticker = security.ticker.trim().to_uppercase();
    if let Some(c) = security.currency.take() {
        security.currency = code(&c);
    }
    if let Some(e) = security.exchange.take() {
        security.exchange = code(&e);
    }
    if let Some(y) = security.dividend_yield_pct {
        security.dividend_yield_pct = Some(dividend_yield_pct(y));
    }
    if let Some(m) = security.market_cap {
        security.market_cap = Some(market_cap(m));
    }
    security.sector = derived_sector(
        security.gics_sector.as_deref(),
        security.asset_class.as_deref(),
    );
}
