//! Theme taxonomy shared by the text-matching factors.
//!
//! Two detectors live here on purpose. Revenue-exposure estimation keys off a
//! narrow theme vocabulary, while sector alignment works from a broader one
//! (it also recognizes financials and China tech). All matching is substring
//! matching over lowercased text.

/// Themes with revenue-exposure decision tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureTheme {
    AiInfrastructure,
    Semiconductor,
    Power,
    Defense,
    RealEstate,
    China,
    Commodities,
}

const EXPOSURE_TRIGGERS: &[(ExposureTheme, &[&str])] = &[
    (
        ExposureTheme::AiInfrastructure,
        &["ai", "artificial intelligence", "data center", "gpu"],
    ),
    (ExposureTheme::Semiconductor, &["semiconductor", "chip"]),
    (
        ExposureTheme::Power,
        &["power", "utility", "energy", "electric"],
    ),
    (
        ExposureTheme::Defense,
        &["defense", "military", "aerospace"],
    ),
    (
        ExposureTheme::RealEstate,
        &["real estate", "reit", "housing"],
    ),
    (ExposureTheme::China, &["china", "chinese"]),
    (
        ExposureTheme::Commodities,
        &["commodity", "mining", "copper", "lithium", "gold"],
    ),
];

/// First trigger wins; the table order is fixed.
pub fn detect_exposure_theme(thesis_text: &str) -> Option<ExposureTheme> {
    EXPOSURE_TRIGGERS
        .iter()
        .find(|(_, triggers)| triggers.iter().any(|kw| thesis_text.contains(kw)))
        .map(|(theme, _)| *theme)
}

/// Keywords counted against the business description. Triggers accumulate:
/// a thesis touching both AI and power contributes both vocabularies.
pub fn description_keywords(thesis_text: &str) -> Vec<&'static str> {
    let mut keywords = Vec::new();

    if thesis_text.contains("ai") || thesis_text.contains("artificial intelligence") {
        keywords.extend([
            "ai",
            "artificial intelligence",
            "machine learning",
            "gpu",
            "data center",
            "cloud",
            "neural",
        ]);
    }
    if thesis_text.contains("semiconductor") || thesis_text.contains("chip") {
        keywords.extend(["semiconductor", "chip", "processor", "fabrication", "wafer"]);
    }
    if thesis_text.contains("infrastructure") {
        keywords.extend([
            "infrastructure",
            "data center",
            "colocation",
            "hosting",
            "connectivity",
        ]);
    }
    if thesis_text.contains("power")
        || thesis_text.contains("energy")
        || thesis_text.contains("utility")
    {
        keywords.extend([
            "power",
            "energy",
            "utility",
            "electric",
            "generation",
            "transmission",
        ]);
    }
    if thesis_text.contains("defense") || thesis_text.contains("military") {
        keywords.extend(["defense", "military", "aerospace", "weapons", "combat"]);
    }
    if thesis_text.contains("china") {
        keywords.extend(["china", "chinese", "asia", "export"]);
    }
    if thesis_text.contains("inflation") || thesis_text.contains("commodity") {
        keywords.extend(["commodity", "gold", "copper", "lithium", "mining", "resources"]);
    }
    if thesis_text.contains("housing") || thesis_text.contains("real estate") {
        keywords.extend([
            "housing",
            "residential",
            "apartment",
            "reit",
            "multifamily",
            "rental",
        ]);
    }

    keywords
}

/// Themes recognized by the sector-alignment factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorTheme {
    AiInfrastructure,
    Semiconductor,
    PowerEnergy,
    Defense,
    RealEstate,
    Financial,
    ChinaTech,
    Commodities,
}

impl SectorTheme {
    /// (perfect, good, related) sector/industry substrings.
    pub fn tiers(self) -> (&'static [&'static str], &'static [&'static str], &'static [&'static str]) {
        match self {
            SectorTheme::AiInfrastructure => (
                &[
                    "semiconductors",
                    "semiconductor",
                    "technology hardware",
                    "data centers",
                    "reits",
                ],
                &["software", "technology", "electric utilities", "utilities"],
                &["communications", "telecommunications"],
            ),
            SectorTheme::Semiconductor => (
                &["semiconductors", "semiconductor", "semiconductor equipment"],
                &["technology hardware", "electronics"],
                &["materials", "industrial"],
            ),
            SectorTheme::PowerEnergy => (
                &[
                    "electric utilities",
                    "utilities",
                    "renewable energy",
                    "independent power",
                ],
                &["oil & gas", "energy", "power generation"],
                &["industrial", "infrastructure"],
            ),
            SectorTheme::Defense => (
                &["aerospace & defense", "defense", "military"],
                &["industrial", "aerospace"],
                &["technology", "communications"],
            ),
            SectorTheme::RealEstate => (
                &["reits", "real estate", "residential", "homebuilders"],
                &["construction", "building materials"],
                &["financial", "mortgage"],
            ),
            SectorTheme::Financial => (
                &["banks", "financial services", "insurance", "asset management"],
                &["credit", "lending", "investment"],
                &["real estate", "fintech"],
            ),
            SectorTheme::ChinaTech => (
                &["technology", "internet", "e-commerce", "software"],
                &["telecommunications", "media", "semiconductors"],
                &["consumer", "automotive"],
            ),
            SectorTheme::Commodities => (
                &["mining", "metals & mining", "gold", "materials"],
                &["basic materials", "resources", "oil & gas"],
                &["energy", "industrial"],
            ),
        }
    }
}

pub fn detect_sector_theme(thesis_text: &str) -> Option<SectorTheme> {
    if ["ai", "data center", "gpu", "semiconductor"]
        .iter()
        .any(|kw| thesis_text.contains(kw))
    {
        Some(SectorTheme::AiInfrastructure)
    } else if thesis_text.contains("semiconductor") || thesis_text.contains("chip") {
        Some(SectorTheme::Semiconductor)
    } else if ["power", "utility", "energy", "electric"]
        .iter()
        .any(|kw| thesis_text.contains(kw))
    {
        Some(SectorTheme::PowerEnergy)
    } else if thesis_text.contains("defense") || thesis_text.contains("military") {
        Some(SectorTheme::Defense)
    } else if thesis_text.contains("real estate")
        || thesis_text.contains("housing")
        || thesis_text.contains("reit")
    {
        Some(SectorTheme::RealEstate)
    } else if ["bank", "financial", "credit", "private equity"]
        .iter()
        .any(|kw| thesis_text.contains(kw))
    {
        Some(SectorTheme::Financial)
    } else if thesis_text.contains("china") || thesis_text.contains("chinese") {
        Some(SectorTheme::ChinaTech)
    } else if ["commodity", "mining", "copper", "lithium", "gold"]
        .iter()
        .any(|kw| thesis_text.contains(kw))
    {
        Some(SectorTheme::Commodities)
    } else {
        None
    }
}

/// Keywords that mark a thesis as income-focused, enabling the dividend
/// quality factor.
pub const INCOME_KEYWORDS: &[&str] = &[
    "dividend",
    "income",
    "yield",
    "payout",
    "distribution",
    "cash flow",
];
