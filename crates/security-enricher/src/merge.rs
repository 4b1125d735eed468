//! Fill-only-null record fusion.
//!
//! Provider priority is positional: whoever wrote a field first keeps it.
//! The enricher applies the market-data patch, then the stored record's
//! descriptive fields, then reference and fundamentals patches, so earlier
//! sources always win per field. Empty strings count as missing.

use screener_core::{Security, SecurityPatch};

fn fill_text(dst: &mut Option<String>, src: &Option<String>) {
    let dst_empty = dst.as_deref().map_or(true, |s| s.trim().is_empty());
    if dst_empty {
        if let Some(value) = src.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            *dst = Some(value.to_string());
        }
    }
}

fn fill_num(dst: &mut Option<f64>, src: Option<f64>) {
    if dst.is_none() {
        *dst = src;
    }
}

/// Copy every field of `patch` into `security` that `security` is missing.
/// Applying the same patch twice is a no-op.
pub fn fill_missing(security: &mut Security, patch: &SecurityPatch) {
    fill_text(&mut security.name, &patch.name);
    fill_text(&mut security.asset_type, &patch.asset_type);
    fill_text(&mut security.exchange, &patch.exchange);
    fill_text(&mut security.currency, &patch.currency);
    fill_num(&mut security.market_cap, patch.market_cap);
    fill_text(&mut security.gics_sector, &patch.gics_sector);
    fill_text(&mut security.gics_industry, &patch.gics_industry);
    fill_text(&mut security.asset_class, &patch.asset_class);
    fill_text(&mut security.industry, &patch.industry);
    fill_text(&mut security.description, &patch.description);
    fill_num(&mut security.current_price, patch.current_price);
    fill_num(&mut security.pe_ratio, patch.pe_ratio);
    fill_num(&mut security.dividend_yield_pct, patch.dividend_yield_pct);
    fill_num(&mut security.week52_high, patch.week52_high);
    fill_num(&mut security.week52_low, patch.week52_low);
    fill_num(&mut security.return_1y, patch.return_1y);
    fill_num(&mut security.return_3m, patch.return_3m);
    fill_num(&mut security.return_1m, patch.return_1m);
    fill_num(&mut security.return_ytd, patch.return_ytd);
    fill_num(&mut security.avg_volume, patch.avg_volume);
    fill_num(&mut security.expense_ratio, patch.expense_ratio);
}

/// Descriptive fields recovered from a previously stored record. Price and
/// performance are deliberately left out: those expire, prose does not.
pub fn descriptive_patch(existing: &Security) -> SecurityPatch {
    SecurityPatch {
        name: existing.name.clone(),
        asset_type: existing.asset_type.clone(),
        exchange: existing.exchange.clone(),
        currency: existing.currency.clone(),
        gics_sector: existing.gics_sector.clone(),
        gics_industry: existing.gics_industry.clone(),
        asset_class: existing.asset_class.clone(),
        industry: existing.industry.clone(),
        description: existing.description.clone(),
        expense_ratio: existing.expense_ratio,
        ..Default::default()
    }
}
