//! Multi-factor scoring of securities against free-text investment theses.
//!
//! Six weighted factors produce a raw score out of 14 points, rescaled onto
//! a 0-10 scale: direct mention (2), business description (3), revenue
//! exposure (3), sector alignment (2), price momentum (2), dividend quality
//! (2). Momentum and dividends are optional inputs; scoring is pure and does
//! no I/O.

pub mod themes;

use chrono::Utc;
use screener_core::{DividendHistory, PricePoint, Security, Thesis, ThesisAlignment};
use themes::ExposureTheme;

/// Fewer daily closes than this and momentum is not scored at all.
const MIN_HISTORY_POINTS: usize = 50;
/// Enough closes for a long moving average; below this the trend half of the
/// momentum factor falls back to neutral.
const TREND_HISTORY_POINTS: usize = 200;
/// Payments needed before dividend growth is measured (two years quarterly).
const MIN_DIVIDEND_PAYMENTS: usize = 8;

const MAX_RAW_SCORE: f64 = 14.0;

#[derive(Default)]
pub struct AlignmentScorer;

impl AlignmentScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        security: &Security,
        thesis: &Thesis,
        history: Option<&[PricePoint]>,
        dividends: Option<&DividendHistory>,
    ) -> ThesisAlignment {
        let thesis_text = thesis.full_text();

        let mut raw = 0.0;
        let mut rationale_parts: Vec<String> = Vec::new();
        let mut exposure_factors: Vec<String> = Vec::new();

        // Factor 1: direct mention (2 points)
        if self.mentioned_in_thesis(security, &thesis_text) {
            raw += 2.0;
            rationale_parts.push("Explicitly mentioned in thesis".to_string());
            exposure_factors.push("Direct thesis mention".to_string());
        }

        // Factor 2: business description alignment (3 points)
        let (business_score, business_rationale) =
            self.score_business_description(security, &thesis_text);
        raw += business_score;
        if !business_rationale.is_empty() {
            rationale_parts.push(business_rationale);
            if business_score > 0.0 {
                exposure_factors.push("Business model alignment".to_string());
            }
        }

        // Factor 3: revenue exposure (3 points)
        let (revenue_score, revenue_pct) = self.estimate_revenue_exposure(security, &thesis_text);
        raw += revenue_score;
        if revenue_score > 0.0 {
            rationale_parts.push(format!("~{revenue_pct:.0}% revenue exposure estimated"));
            exposure_factors.push(format!("Revenue exposure: {revenue_pct:.0}%"));
        }

        // Factor 4: sector alignment (2 points)
        let sector_score = self.score_sector_alignment(security, &thesis_text);
        raw += sector_score;
        if sector_score > 0.0 {
            rationale_parts.push("Industry sector alignment".to_string());
            exposure_factors.push("Sector classification match".to_string());
        }

        // Factor 5: price momentum (2 points, when history is available)
        if let Some(history) = history {
            let (momentum_score, momentum_rationale) = self.momentum_score(history);
            raw += momentum_score;
            if momentum_score > 0.0 && !momentum_rationale.is_empty() {
                rationale_parts.push(momentum_rationale);
                exposure_factors.push("Price momentum".to_string());
            }
        }

        // Factor 6: dividend quality (2 points, income theses only)
        if let Some(dividends) = dividends {
            let (dividend_score, dividend_rationale) =
                self.score_dividend_quality(security, dividends, &thesis_text);
            raw += dividend_score;
            if dividend_score > 0.0 && !dividend_rationale.is_empty() {
                rationale_parts.push(dividend_rationale);
                exposure_factors.push("Dividend quality".to_string());
            }
        }

        let scaled = round2(raw / MAX_RAW_SCORE * 10.0);
        tracing::debug!(
            ticker = %security.ticker,
            thesis = %thesis.id,
            raw,
            scaled,
            "alignment scored"
        );

        ThesisAlignment {
            thesis_id: thesis.id.clone(),
            ticker: security.ticker.clone(),
            score: scaled,
            rationale: if rationale_parts.is_empty() {
                "Limited alignment found".to_string()
            } else {
                rationale_parts.join("; ")
            },
            exposure_factors,
            revenue_exposure_pct: (revenue_score > 0.0).then_some(revenue_pct),
            last_updated: Some(Utc::now()),
        }
    }

    fn mentioned_in_thesis(&self, security: &Security, thesis_text: &str) -> bool {
        thesis_text
            .to_uppercase()
            .contains(&security.ticker.to_uppercase())
    }

    /// Keyword density of the theme vocabulary over the business description
    /// (0.5-3.0). A missing description scores the floor, never zero.
    fn score_business_description(&self, security: &Security, thesis_text: &str) -> (f64, String) {
        let description = match security.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_lowercase(),
            _ => return (0.5, "Limited business information available".to_string()),
        };

        let keywords = themes::description_keywords(thesis_text);
        let matches = keywords.iter().filter(|kw| description.contains(*kw)).count();
        let density = if keywords.is_empty() {
            0.0
        } else {
            matches as f64 / keywords.len() as f64
        };

        if density >= 0.40 {
            (
                3.0,
                "Strong business model alignment - core business directly addresses thesis"
                    .to_string(),
            )
        } else if density >= 0.25 {
            (
                2.5,
                "High business model alignment - significant operations in thesis area".to_string(),
            )
        } else if density >= 0.15 {
            (
                2.0,
                "Meaningful business model alignment - substantial exposure to thesis theme"
                    .to_string(),
            )
        } else if density >= 0.08 {
            (
                1.5,
                "Moderate business model alignment - some operations related to thesis".to_string(),
            )
        } else if density >= 0.04 {
            (
                1.0,
                "Limited business model alignment - tangential exposure to thesis".to_string(),
            )
        } else {
            (
                0.5,
                "Minimal business model alignment - limited relevance to thesis".to_string(),
            )
        }
    }

    /// Theme-specific decision table mapping company traits to an estimated
    /// revenue exposure percentage, then to 0.5-3.0 points.
    fn estimate_revenue_exposure(&self, security: &Security, thesis_text: &str) -> (f64, f64) {
        let Some(theme) = themes::detect_exposure_theme(thesis_text) else {
            return (1.0, 20.0);
        };

        let desc = security
            .description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let name = security.name.as_deref().unwrap_or_default().to_lowercase();
        let sector = security
            .sector
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let exposure_pct = match theme {
            ExposureTheme::AiInfrastructure => {
                if name.contains("nvidia") || desc.contains("nvda") {
                    85.0
                } else if name.contains("amd") || name.contains("advanced micro") {
                    60.0
                } else if desc.contains("data center") && sector.contains("reit") {
                    75.0
                } else if sector.contains("semiconductor")
                    && ["gpu", "ai", "accelerator"].iter().any(|kw| desc.contains(kw))
                {
                    70.0
                } else if sector.contains("semiconductor") {
                    40.0
                } else if desc.contains("cloud") || desc.contains("azure") {
                    35.0
                } else if sector.contains("utility") && desc.contains("data center") {
                    25.0
                } else if sector.contains("utility") {
                    8.0
                } else {
                    15.0
                }
            }
            ExposureTheme::Semiconductor => {
                if desc.contains("fabrication") || desc.contains("foundry") {
                    90.0
                } else if desc.contains("lithography") || name.contains("asml") {
                    95.0
                } else if sector.contains("semiconductor") {
                    80.0
                } else if desc.contains("equipment") && desc.contains("semiconductor") {
                    85.0
                } else {
                    20.0
                }
            }
            ExposureTheme::Defense => {
                if sector.contains("defense") || sector.contains("aerospace") {
                    70.0
                } else if desc.contains("military") {
                    60.0
                } else if desc.contains("government") && desc.contains("contractor") {
                    50.0
                } else {
                    15.0
                }
            }
            ExposureTheme::Power => {
                if desc.contains("renewable") || desc.contains("clean energy") {
                    80.0
                } else if sector.contains("utility") || sector.contains("electric") {
                    90.0
                } else if desc.contains("power generation") {
                    85.0
                } else if desc.contains("natural gas") && desc.contains("lng") {
                    75.0
                } else {
                    30.0
                }
            }
            ExposureTheme::RealEstate => {
                if sector.contains("reit") {
                    95.0
                } else if desc.contains("residential") || desc.contains("multifamily") {
                    85.0
                } else if desc.contains("homebuilder") || desc.contains("housing") {
                    90.0
                } else {
                    25.0
                }
            }
            ExposureTheme::China => {
                if desc.contains("china") || desc.contains("chinese") {
                    80.0
                } else if desc.contains("asia") || desc.contains("hong kong") {
                    60.0
                } else {
                    20.0
                }
            }
            ExposureTheme::Commodities => {
                if desc.contains("mining") || desc.contains("miner") {
                    90.0
                } else if ["copper", "lithium", "gold", "silver"]
                    .iter()
                    .any(|metal| desc.contains(metal))
                {
                    85.0
                } else if desc.contains("resources") || sector.contains("materials") {
                    70.0
                } else {
                    15.0
                }
            }
        };

        let score = if exposure_pct >= 85.0 {
            3.0
        } else if exposure_pct >= 70.0 {
            2.5
        } else if exposure_pct >= 50.0 {
            2.0
        } else if exposure_pct >= 30.0 {
            1.5
        } else if exposure_pct >= 10.0 {
            1.0
        } else {
            0.5
        };

        (score, exposure_pct)
    }

    /// 0.3-2.0 points from the per-theme sector tier tables. A thesis whose
    /// theme is unknown scores a neutral 1.0.
    fn score_sector_alignment(&self, security: &Security, thesis_text: &str) -> f64 {
        let Some(theme) = themes::detect_sector_theme(thesis_text) else {
            return 1.0;
        };

        let sector = security
            .sector
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let industry = security
            .industry
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        let (perfect, good, related) = theme.tiers();
        let hit = |candidates: &[&str]| {
            candidates
                .iter()
                .any(|c| sector.contains(c) || industry.contains(c))
        };

        if hit(perfect) {
            2.0
        } else if hit(good) {
            1.5
        } else if hit(related) {
            1.0
        } else {
            0.3
        }
    }

    /// 0-2 points: position within the 52-week range (0-1) plus trend from
    /// the 50-day average against the long average (0.25-1).
    fn momentum_score(&self, history: &[PricePoint]) -> (f64, String) {
        if history.len() < MIN_HISTORY_POINTS {
            return (0.0, "Insufficient price history".to_string());
        }

        let closes: Vec<f64> = history.iter().map(|p| p.close).collect();
        let current = closes[closes.len() - 1];
        let high = closes.iter().cloned().fold(f64::MIN, f64::max);
        let low = closes.iter().cloned().fold(f64::MAX, f64::min);
        let range = high - low;

        if range == 0.0 {
            return (0.0, "No price movement".to_string());
        }

        let position = (current - low) / range;

        let trend_score = if closes.len() >= TREND_HISTORY_POINTS {
            let avg_50: f64 = closes[closes.len() - 50..].iter().sum::<f64>() / 50.0;
            let avg_long: f64 = closes.iter().sum::<f64>() / closes.len() as f64;
            if avg_50 > avg_long * 1.02 {
                1.0
            } else if avg_50 > avg_long {
                0.75
            } else if avg_50 > avg_long * 0.98 {
                0.5
            } else {
                0.25
            }
        } else {
            0.5
        };

        let position_pct = position * 100.0;
        let position_desc = if position > 0.90 {
            format!("near 52-week high ({position_pct:.0}% of range)")
        } else if position > 0.70 {
            format!("in upper range ({position_pct:.0}% of 52-week range)")
        } else if position > 0.50 {
            format!("mid-range ({position_pct:.0}% of 52-week range)")
        } else if position > 0.30 {
            format!("in lower range ({position_pct:.0}% of 52-week range)")
        } else {
            format!("near 52-week low ({position_pct:.0}% of range)")
        };

        let trend_desc = if trend_score >= 0.75 {
            "strong uptrend"
        } else if trend_score >= 0.5 {
            "uptrending"
        } else {
            "downtrending"
        };

        (
            round2(position + trend_score),
            format!("Price momentum: {position_desc}, {trend_desc}"),
        )
    }

    /// 0-2 points, only for income-focused theses: yield tier (0-1) plus
    /// dividend growth over roughly two years of payments (0-1).
    fn score_dividend_quality(
        &self,
        security: &Security,
        dividends: &DividendHistory,
        thesis_text: &str,
    ) -> (f64, String) {
        let is_income_thesis = themes::INCOME_KEYWORDS
            .iter()
            .any(|kw| thesis_text.contains(kw));
        if !is_income_thesis {
            return (0.0, String::new());
        }

        if dividends.payments.is_empty() {
            return (0.0, "No dividend payments".to_string());
        }

        // Stored yields are on the percentage scale
        let yield_pct = security.dividend_yield_pct.unwrap_or(0.0);
        let (yield_score, yield_desc) = if yield_pct > 4.0 {
            (1.0, format!("excellent {yield_pct:.1}% yield"))
        } else if yield_pct > 3.0 {
            (0.75, format!("good {yield_pct:.1}% yield"))
        } else if yield_pct > 2.0 {
            (0.5, format!("moderate {yield_pct:.1}% yield"))
        } else if yield_pct > 0.0 {
            (0.25, format!("low {yield_pct:.1}% yield"))
        } else {
            (0.0, "no yield".to_string())
        };

        // Payments are oldest first
        let (growth_score, growth_desc) = if dividends.payments.len() >= MIN_DIVIDEND_PAYMENTS {
            let oldest = dividends.payments[0].amount;
            let newest = dividends.payments[dividends.payments.len() - 1].amount;
            if oldest > 0.0 {
                let growth = (newest - oldest) / oldest;
                if growth > 0.10 {
                    (1.0, format!("{:.0}% growth", growth * 100.0))
                } else if growth > 0.05 {
                    (0.75, format!("{:.0}% growth", growth * 100.0))
                } else if growth > 0.0 {
                    (0.5, format!("{:.0}% growth", growth * 100.0))
                } else {
                    (0.0, "declining".to_string())
                }
            } else {
                (0.0, "no growth data".to_string())
            }
        } else {
            (0.0, "limited history".to_string())
        };

        (
            round2(yield_score + growth_score),
            format!("Dividend quality: {yield_desc}, {growth_desc}"),
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
