// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-item categorization.
//!
//! A fixed keyword table maps line descriptions to the category set GL
//! mappings are keyed by. First match wins; the table order is part of the
//! contract.

use std::fmt;
use std::sync::LazyLock;

/// Charge categories recognized on feedlot invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineCategory {
    /// Yardage / pen fees.
    Yardage,
    /// Veterinary and medicine charges.
    Vet,
    /// Freight and hauling.
    Freight,
    /// Death loss.
    DeathLoss,
    /// Interest and finance charges.
    Interest,
    /// Processing charges.
    Processing,
    /// Beef checkoff assessments.
    Checkoff,
    /// Brand inspection.
    Brand,
    /// Insurance.
    Insurance,
    /// Feed and ration charges.
    Feed,
    /// Explicitly miscellaneous.
    Misc,
    /// Nothing in the table matched.
    Uncategorized,
}

impl LineCategory {
    /// Canonical wire string, used as the GL mapping key.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yardage => "YARDAGE",
            Self::Vet => "VET",
            Self::Freight => "FREIGHT",
            Self::DeathLoss => "DEATH_LOSS",
            Self::Interest => "INTEREST",
            Self::Processing => "PROCESSING",
            Self::Checkoff => "CHECKOFF",
            Self::Brand => "BRAND",
            Self::Insurance => "INSURANCE",
            Self::Feed => "FEED",
            Self::Misc => "MISC",
            Self::Uncategorized => "UNCATEGORIZED",
        }
    }
}

impl fmt::Display for LineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pattern table in match order. Specific categories come before `Feed`
/// because feed wording shows up inside many composite descriptions.
static PATTERNS: LazyLock<Vec<(regex::Regex, LineCategory)>> = LazyLock::new(|| {
    let table: &[(&str, LineCategory)] = &[
        (r"(?i)\byardage\b|\bpen\s+rent\b", LineCategory::Yardage),
        (
            r"(?i)\bvet\b|veterinar|\bmedicine\b|\bmedical\b|\btreat(ment)?\b",
            LineCategory::Vet,
        ),
        (r"(?i)\bfreight\b|\bhaul(ing)?\b|\btrucking\b", LineCategory::Freight),
        (r"(?i)\bdeath\b|\bdead\b", LineCategory::DeathLoss),
        (r"(?i)\binterest\b|finance\s+charge", LineCategory::Interest),
        (r"(?i)\bprocessing\b|\bprocess\s+fee\b", LineCategory::Processing),
        (r"(?i)\bcheck\s?-?off\b|beef\s+council", LineCategory::Checkoff),
        (r"(?i)\bbrand\b", LineCategory::Brand),
        (r"(?i)\binsuran", LineCategory::Insurance),
        (r"(?i)\bfeed\b|\bration\b|\bgrain\b", LineCategory::Feed),
        (r"(?i)\bmisc(ellaneous)?\b|\bother\b", LineCategory::Misc),
    ];
    table
        .iter()
        .map(|(pattern, category)| {
            (
                regex::Regex::new(pattern).expect("category pattern must compile"),
                *category,
            )
        })
        .collect()
});

/// Categorize a line description. Deterministic first-match wins.
#[must_use]
pub fn categorize_line(description: &str) -> LineCategory {
    for (pattern, category) in PATTERNS.iter() {
        if pattern.is_match(description) {
            return *category;
        }
    }
    LineCategory::Uncategorized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_descriptions_categorize() {
        assert_eq!(categorize_line("FEED CHARGES"), LineCategory::Feed);
        assert_eq!(categorize_line("Yardage 30 days"), LineCategory::Yardage);
        assert_eq!(categorize_line("Vet & Medicine"), LineCategory::Vet);
        assert_eq!(categorize_line("Freight to plant"), LineCategory::Freight);
        assert_eq!(categorize_line("DEATH LOSS"), LineCategory::DeathLoss);
        assert_eq!(categorize_line("Interest on note"), LineCategory::Interest);
        assert_eq!(categorize_line("Processing fee"), LineCategory::Processing);
        assert_eq!(categorize_line("Beef Council checkoff"), LineCategory::Checkoff);
        assert_eq!(categorize_line("Brand inspection"), LineCategory::Brand);
        assert_eq!(categorize_line("Insurance premium"), LineCategory::Insurance);
        assert_eq!(categorize_line("Misc supplies"), LineCategory::Misc);
        assert_eq!(categorize_line("Totally novel thing"), LineCategory::Uncategorized);
    }

    #[test]
    fn first_match_wins_over_feed() {
        // "feed" appears, but the yardage wording is more specific and comes
        // first in the table.
        assert_eq!(categorize_line("Yardage and feed handling"), LineCategory::Yardage);
        assert_eq!(categorize_line("Death loss feed adjustment"), LineCategory::DeathLoss);
    }

    #[test]
    fn categorization_is_case_insensitive() {
        assert_eq!(categorize_line("feed charges"), LineCategory::Feed);
        assert_eq!(categorize_line("FEED CHARGES"), LineCategory::Feed);
    }
}
