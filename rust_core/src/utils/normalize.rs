//! Name normalization for cross-provider matching.
//!
//! - Lowercase + diacritic folding (NFD, combining marks dropped)
//! - Punctuation and whitespace collapsed to single spaces
//! - Whole-token club affixes removed ("FC Barcelona" -> "barcelona")
//!
//! Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Club-type prefixes/suffixes that carry no identity on their own.
/// Matched only as whole tokens, after folding, so "1." arrives here as "1".
const CLUB_AFFIXES: &[&str] = &[
    "fc", "cf", "sc", "if", "afc", "club", "ac", "cd", "sv", "calcio", "ssc", "as", "sk", "fk",
    "bk", "ud", "sd", "rc", "cp", "ca", "vfb", "vfl", "tsv", "fsv", "ssd",
    "nk", "ik", "aik", "ff", "bsc", "kv", "kaa", "krc", "ogc", "ec", "se", "1", "de",
];

/// Letters NFD does not decompose into base + mark.
fn fold_special(c: char) -> Option<&'static str> {
    match c {
        'ø' => Some("o"),
        'æ' => Some("ae"),
        'œ' => Some("oe"),
        'ß' => Some("ss"),
        'đ' | 'ð' => Some("d"),
        'ł' => Some("l"),
        'ı' => Some("i"),
        'þ' => Some("th"),
        _ => None,
    }
}

/// Lowercase, strip diacritics, and replace anything non-alphanumeric with a space.
fn fold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.to_lowercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if let Some(folded) = fold_special(c) {
            out.push_str(folded);
        } else if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out
}

fn is_club_affix(token: &str) -> bool {
    CLUB_AFFIXES.contains(&token)
}

/// Normalize a team or league name for comparison.
///
/// ```
/// use teammap_rust_core::utils::normalize::normalize;
///
/// assert_eq!(normalize("FC Barcelona"), "barcelona");
/// assert_eq!(normalize("Bayern München"), "bayern munchen");
/// ```
pub fn normalize(raw: &str) -> String {
    let folded = fold(raw);
    let tokens: Vec<&str> = folded.split_whitespace().collect();

    let significant: Vec<&str> = tokens.iter().copied().filter(|t| !is_club_affix(t)).collect();

    // A name made only of affixes ("AC", "Club") keeps them rather than vanishing
    if significant.is_empty() {
        tokens.join(" ")
    } else {
        significant.join(" ")
    }
}

/// Normalize a country label. Blank input means "unknown".
pub fn normalize_country(raw: &str) -> Option<String> {
    let folded = fold(raw);
    let joined = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Split a normalized name into tokens.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_and_prefix_removed() {
        assert_eq!(normalize("FC Barcelona"), "barcelona");
        assert_eq!(normalize("Barcelona"), "barcelona");
        assert_eq!(normalize("Arsenal FC"), "arsenal");
        assert_eq!(normalize("AC Milan"), "milan");
        assert_eq!(normalize("SSC Napoli"), "napoli");
        assert_eq!(normalize("Hamburger SV"), "hamburger");
    }

    #[test]
    fn test_affix_only_inside_word_is_kept() {
        // "fc" inside a word is not a token
        assert_eq!(normalize("Fcsb"), "fcsb");
        assert_eq!(normalize("Ascoli"), "ascoli");
    }

    #[test]
    fn test_diacritics_stripped() {
        assert_eq!(normalize("Atlético Madrid"), "atletico madrid");
        assert_eq!(normalize("Bodø/Glimt"), "bodo glimt");
        assert_eq!(normalize("Fenerbahçe"), "fenerbahce");
        assert_eq!(normalize("Borussia Mönchengladbach"), "borussia monchengladbach");
    }

    #[test]
    fn test_punctuation_and_whitespace_collapse() {
        assert_eq!(normalize("  Man.   United  "), "man united");
        assert_eq!(normalize("Brighton & Hove Albion"), "brighton hove albion");
        assert_eq!(normalize("Paris Saint-Germain"), "paris saint germain");
    }

    #[test]
    fn test_never_empties_a_name() {
        assert_eq!(normalize("Inter"), "inter");
        assert_eq!(normalize("AC"), "ac");
        assert_eq!(normalize("Club"), "club");
        assert_eq!(normalize("FC  Club"), "fc club");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "FC Barcelona",
            "Bodø/Glimt",
            "AC",
            "1. FC Köln",
            "1. FC",
            "Deportivo de La Coruña",
            "Internazionale",
            "  Sporting   CP ",
            "Ümraniyespor",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_digits_survive() {
        assert_eq!(normalize("FC Schalke 04"), "schalke 04");
        assert_eq!(normalize("TSV 1860 München"), "1860 munchen");
    }

    #[test]
    fn test_numbered_prefix_and_particle_removed() {
        assert_eq!(normalize("1. FC Köln"), "koln");
        assert_eq!(normalize("1. FSV Mainz 05"), "mainz 05");
        assert_eq!(normalize("Deportivo de La Coruña"), "deportivo la coruna");
        // Particle only as a whole token
        assert_eq!(normalize("Defensor Sporting"), "defensor sporting");
        assert_eq!(normalize("1. FC"), "1 fc");
    }

    #[test]
    fn test_country_normalization() {
        assert_eq!(normalize_country(" Côte d'Ivoire "), Some("cote d ivoire".to_string()));
        assert_eq!(normalize_country("   "), None);
        assert_eq!(normalize_country("ENGLAND"), Some("england".to_string()));
    }
}
