// SPDX-License-Identifier: MIT OR Apache-2.0
//! Name and address normalization for vendor matching.
//!
//! `"BOVINA FEEDERS INC. DBA BF2"` normalizes to `"BOVINA FEEDERS BF2"`;
//! `"Mesquite Cattle Feeders, LLC"` to `"MESQUITE CATTLE FEEDERS"`.

/// Business suffixes dropped during normalization.
const BUSINESS_SUFFIXES: &[&str] = &[
    "INC",
    "INCORPORATED",
    "CORP",
    "CORPORATION",
    "CO",
    "COMPANY",
    "LLC",
    "L.L.C.",
    "LTD",
    "LIMITED",
    "LP",
    "L.P.",
    "LLP",
    "L.L.P.",
    "PC",
    "P.C.",
    "PA",
    "P.A.",
    "PLLC",
    "P.L.L.C.",
    "DBA",
    "D.B.A.",
    "D/B/A",
    "AKA",
    "A.K.A.",
    "AND",
    "&",
    "THE",
];

/// Words carrying no matching signal.
const NOISE_WORDS: &[&str] = &["THE", "AND", "OF", "FOR", "A", "AN"];

/// Two-letter US state and territory codes.
const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC", "PR", "VI", "GU",
];

/// Full state names we see on feedlot paperwork.
const STATE_NAMES: &[(&str, &str)] = &[
    ("TEXAS", "TX"),
    ("CALIFORNIA", "CA"),
    ("WASHINGTON", "WA"),
    ("NEW YORK", "NY"),
    ("FLORIDA", "FL"),
    ("ARIZONA", "AZ"),
    ("NEW MEXICO", "NM"),
    ("OKLAHOMA", "OK"),
    ("KANSAS", "KS"),
    ("NEBRASKA", "NE"),
    ("COLORADO", "CO"),
];

/// Normalize a vendor or feedlot name: uppercase, strip business suffixes and
/// most punctuation (hyphens survive), collapse whitespace.
#[must_use]
pub fn normalize_vendor_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.to_uppercase().chars() {
        match ch {
            '.' | ',' | ';' | ':' | '!' | '?' | '(' | ')' | '"' | '\'' | '[' | ']' | '{'
            | '}' => cleaned.push(' '),
            other => cleaned.push(other),
        }
    }
    cleaned
        .split_whitespace()
        .filter(|token| !BUSINESS_SUFFIXES.contains(token))
        .filter(|token| !matches!(*token, "&" | "-" | "/"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize a (normalized) name into unique significant tokens, preserving
/// order. Noise words and single characters are dropped.
#[must_use]
pub fn tokenize_name(name: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut tokens = Vec::new();
    for token in name.to_uppercase().split_whitespace() {
        if NOISE_WORDS.contains(&token) || token.chars().count() <= 1 {
            continue;
        }
        if seen.insert(token.to_string()) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Token-set similarity in `[0, 1]`: Jaccard overlap plus a first-token bonus
/// (0.15) and a partial-substring bonus (at most 0.2), capped at 1.
#[must_use]
pub fn token_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: std::collections::BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let jaccard = intersection.len() as f64 / union as f64;

    let first_bonus = if a[0] == b[0] { 0.15 } else { 0.0 };

    // Partial matches rescue abbreviations (BF2 vs BF-2 style drift).
    let mut partial: f64 = 0.0;
    for t1 in set_a.difference(&set_b) {
        for t2 in set_b.difference(&set_a) {
            if t1.len() >= 3 && t2.len() >= 3 && (t1.contains(t2) || t2.contains(t1)) {
                partial += 0.5;
                break;
            }
        }
    }
    let partial_bonus = (partial * 0.1).min(0.2);

    (jaccard + first_bonus + partial_bonus).min(1.0)
}

/// Character-level similarity in `[0, 1]`: containment ratio when one string
/// contains the other, char-set Jaccard otherwise.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = a.to_uppercase();
    let b = b.to_uppercase();
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        let shorter = a.chars().count().min(b.chars().count()) as f64;
        let longer = a.chars().count().max(b.chars().count()) as f64;
        return shorter / longer;
    }
    let chars_a: std::collections::BTreeSet<char> =
        a.chars().filter(|c| !c.is_whitespace()).collect();
    let chars_b: std::collections::BTreeSet<char> =
        b.chars().filter(|c| !c.is_whitespace()).collect();
    if chars_a.is_empty() || chars_b.is_empty() {
        return 0.0;
    }
    chars_a.intersection(&chars_b).count() as f64 / chars_a.union(&chars_b).count() as f64
}

/// Normalized `(street, city, state)` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    /// Upper-cased street with `.,#` stripped.
    pub street: String,
    /// Upper-cased city.
    pub city: String,
    /// Two-letter state code when recognized.
    pub state: String,
}

/// Normalize raw address components for comparison.
#[must_use]
pub fn address_parts(
    address_line1: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> AddressParts {
    let street = address_line1
        .map(|s| {
            s.to_uppercase()
                .chars()
                .filter(|c| !matches!(c, '.' | ',' | '#'))
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let city = city.map(|c| c.trim().to_uppercase()).unwrap_or_default();
    let state = state
        .map(|s| {
            let upper = s.trim().to_uppercase();
            if US_STATES.contains(&upper.as_str()) {
                upper
            } else if let Some((_, code)) = STATE_NAMES.iter().find(|(name, _)| *name == upper) {
                (*code).to_string()
            } else {
                upper.chars().take(2).collect()
            }
        })
        .unwrap_or_default();
    AddressParts {
        street,
        city,
        state,
    }
}

/// Address similarity in `[0, 1]`: state 0.4, city 0.35 (0.2 partial),
/// street similarity scaled by 0.25.
#[must_use]
pub fn address_similarity(a: &AddressParts, b: &AddressParts) -> f64 {
    let mut score = 0.0;
    let mut comparable = false;
    if !a.state.is_empty() && !b.state.is_empty() {
        comparable = true;
        if a.state == b.state {
            score += 0.4;
        }
    }
    if !a.city.is_empty() && !b.city.is_empty() {
        comparable = true;
        if a.city == b.city {
            score += 0.35;
        } else if a.city.contains(&b.city) || b.city.contains(&a.city) {
            score += 0.2;
        }
    }
    if !a.street.is_empty() && !b.street.is_empty() {
        comparable = true;
        score += string_similarity(&a.street, &b.street) * 0.25;
    }
    if comparable { score } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_suffixes_and_punctuation() {
        assert_eq!(
            normalize_vendor_name("BOVINA FEEDERS INC. DBA BF2"),
            "BOVINA FEEDERS BF2"
        );
        assert_eq!(
            normalize_vendor_name("Mesquite Cattle Feeders, LLC"),
            "MESQUITE CATTLE FEEDERS"
        );
        assert_eq!(
            normalize_vendor_name("Sugar Mountain Livestock"),
            "SUGAR MOUNTAIN LIVESTOCK"
        );
    }

    #[test]
    fn hyphens_survive_normalization() {
        assert_eq!(normalize_vendor_name("AG-GRO Services"), "AG-GRO SERVICES");
    }

    #[test]
    fn tokenize_drops_noise_and_dedups() {
        assert_eq!(
            tokenize_name("BOVINA FEEDERS BOVINA OF BF2"),
            vec!["BOVINA", "FEEDERS", "BF2"]
        );
    }

    #[test]
    fn identical_token_sets_score_one() {
        let tokens = tokenize_name("BOVINA FEEDERS BF2");
        assert!((token_similarity(&tokens, &tokens) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn first_token_match_gets_bonus() {
        let a = tokenize_name("BOVINA FEEDERS");
        let b = tokenize_name("BOVINA CATTLE");
        let c = tokenize_name("CATTLE BOVINA");
        assert!(token_similarity(&a, &b) > token_similarity(&a, &c));
    }

    #[test]
    fn containment_uses_length_ratio() {
        let sim = string_similarity("BOVINA", "BOVINA FEEDERS");
        assert!((sim - 6.0 / 14.0).abs() < 1e-9);
    }

    #[test]
    fn state_normalization_handles_full_names() {
        assert_eq!(address_parts(None, None, Some("Texas")).state, "TX");
        assert_eq!(address_parts(None, None, Some("tx")).state, "TX");
    }

    #[test]
    fn address_similarity_weighs_state_and_city() {
        let a = address_parts(Some("100 Feed Rd."), Some("Bovina"), Some("TX"));
        let b = address_parts(Some("100 Feed Rd"), Some("Bovina"), Some("TX"));
        let sim = address_similarity(&a, &b);
        assert!(sim > 0.95, "{sim}");
        let c = address_parts(None, Some("Mesquite"), Some("NM"));
        assert!(address_similarity(&a, &c) < 0.1);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(name in "[A-Za-z0-9 .,&'-]{0,40}") {
            let once = normalize_vendor_name(&name);
            let twice = normalize_vendor_name(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn token_similarity_is_bounded(a in "[A-Z ]{0,30}", b in "[A-Z ]{0,30}") {
            let sim = token_similarity(&tokenize_name(&a), &tokenize_name(&b));
            prop_assert!((0.0..=1.0).contains(&sim));
        }
    }
}
