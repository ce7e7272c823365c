use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// A compiled unsafe-advice pattern.
pub struct UnsafePattern {
    pub regex: Regex,
    pub label: &'static str,
}

/// Advice that must never reach a patient unreviewed.
pub static UNSAFE_PATTERNS: LazyLock<Vec<UnsafePattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\bignore\s+(?:all\s+)?medical\s+advice\b", "ignore medical advice"),
        pattern(r"(?i)\b(?:don[’']?t|do\s+not)\s+see\s+a\s+doctor\b", "don't see a doctor"),
        pattern(r"(?i)\bavoid\s+medical\s+treatment\b", "avoid medical treatment"),
        pattern(r"(?i)\bself[-\s]?medicat(?:e|ing|ion)\b", "self-medicate"),
        pattern(r"(?i)\bhome\s+surgery\b", "home surgery"),
        pattern(r"(?i)\bdangerous\s+dos(?:age|e)\b", "dangerous dosage"),
        pattern(r"(?i)\bexperimental\s+treatments?\b", "experimental treatment"),
        pattern(r"(?i)\bunproven\s+cures?\b", "unproven cure"),
    ]
});

fn pattern(re: &str, label: &'static str) -> UnsafePattern {
    UnsafePattern {
        regex: Regex::new(re).expect("Invalid safety regex pattern"),
        label,
    }
}

/// Urgency vocabulary; three or more distinct hits warrant a check on the
/// stated urgency level.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "emergency",
    "urgent",
    "immediate",
    "critical",
    "life-threatening",
    "severe",
    "acute",
    "shock",
    "unconscious",
    "bleeding",
    "seizure",
];

pub const EMERGENCY_KEYWORD_LIMIT: usize = 3;

/// Medications to flag when recommended for patients under 18.
pub const PEDIATRIC_CAUTION_MEDICATIONS: &[&str] =
    &["aspirin", "tetracycline", "quinolone", "warfarin"];

/// Medications to flag when recommended for patients over 65.
pub const ELDERLY_CAUTION_MEDICATIONS: &[&str] =
    &["benzodiazepine", "anticholinergic", "high-dose nsaid"];

/// Labels of every unsafe pattern found in `text`.
pub fn find_unsafe(text: &str) -> Vec<&'static str> {
    UNSAFE_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.label)
        .collect()
}

/// Distinct emergency keywords present as whole words in lowercased
/// `text`. Hyphenated words stay whole, so `life-threatening` matches.
pub fn emergency_keywords(text: &str) -> Vec<&'static str> {
    let words: BTreeSet<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();
    EMERGENCY_KEYWORDS
        .iter()
        .copied()
        .filter(|k| words.contains(k))
        .collect()
}
