use super::table::KnowledgeTable;

/// Minimum shared run of characters for a fuzzy match.
const MIN_FUZZY_OVERLAP: usize = 4;

/// Shared run must cover this fraction of the shorter string.
const MIN_FUZZY_RATIO: f64 = 0.6;

/// How a raw token was resolved onto a canonical symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Synonym,
    Fuzzy,
}

/// Normalization outcome with the tokens that could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct NormalizationReport {
    /// Canonical symptom ids, deduplicated, in first-seen order.
    pub canonical: Vec<String>,
    pub unmatched: Vec<String>,
}

impl NormalizationReport {
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

/// Maps raw symptom tokens and phrases onto the closed set of canonical
/// symptom identifiers of a knowledge table.
pub struct SymptomNormalizer<'a> {
    table: &'a KnowledgeTable,
}

impl<'a> SymptomNormalizer<'a> {
    pub fn new(table: &'a KnowledgeTable) -> Self {
        Self { table }
    }

    /// Resolve one raw token. Precedence: exact canonical id, exact synonym,
    /// synonym contained in the phrase, then longest-common-substring.
    pub fn resolve(&self, raw: &str) -> Option<(String, MatchKind)> {
        let token = fold_token(raw);
        if token.is_empty() {
            return None;
        }

        if self.table.contains_symptom(&token) {
            return Some((token, MatchKind::Exact));
        }

        for group in self.table.synonyms() {
            if group.synonyms.iter().any(|s| *s == token) {
                return Some((group.canonical.clone(), MatchKind::Synonym));
            }
        }

        for group in self.table.synonyms() {
            if group.synonyms.iter().any(|s| token.contains(s.as_str())) {
                return Some((group.canonical.clone(), MatchKind::Synonym));
            }
        }

        self.fuzzy_match(&token)
            .map(|canonical| (canonical.to_string(), MatchKind::Fuzzy))
    }

    /// Canonical ids for a list of raw tokens; unmatched tokens are dropped.
    pub fn normalize(&self, symptoms: &[String]) -> Vec<String> {
        self.normalize_with_report(symptoms).canonical
    }

    pub fn normalize_with_report(&self, symptoms: &[String]) -> NormalizationReport {
        let mut report = NormalizationReport::default();
        for raw in symptoms {
            match self.resolve(raw) {
                Some((canonical, _)) => {
                    if !report.canonical.contains(&canonical) {
                        report.canonical.push(canonical);
                    }
                }
                None => {
                    if !raw.trim().is_empty() {
                        report.unmatched.push(raw.trim().to_string());
                    }
                }
            }
        }

        if !report.unmatched.is_empty() {
            tracing::debug!(
                matched = report.canonical.len(),
                unmatched = report.unmatched.len(),
                "Some symptom tokens did not resolve"
            );
        }

        report
    }

    /// Best canonical id by longest common substring. Ties go to the
    /// higher coverage ratio, then to the lexicographically first id.
    fn fuzzy_match(&self, token: &str) -> Option<&'a str> {
        let mut best: Option<(&str, usize, f64)> = None;

        for canonical in self.table.symptom_ids() {
            let overlap = longest_common_substring(token, canonical);
            if overlap < MIN_FUZZY_OVERLAP {
                continue;
            }
            let shorter = token.chars().count().min(canonical.chars().count());
            let ratio = overlap as f64 / shorter as f64;
            if ratio < MIN_FUZZY_RATIO {
                continue;
            }

            let better = match best {
                None => true,
                Some((_, best_overlap, best_ratio)) => {
                    overlap > best_overlap || (overlap == best_overlap && ratio > best_ratio)
                }
            };
            if better {
                best = Some((canonical, overlap, ratio));
            }
        }

        best.map(|(c, _, _)| c)
    }
}

/// Lowercase, trim, fold spaces and hyphens to underscores.
pub fn fold_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Length in characters of the longest common substring.
pub fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    let mut best = 0;

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                0
            };
            best = best.max(curr[j]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_wins() {
        let table = KnowledgeTable::builtin();
        let normalizer = SymptomNormalizer::new(&table);
        assert_eq!(
            normalizer.resolve("Fever"),
            Some(("fever".into(), MatchKind::Exact))
        );
        assert_eq!(
            normalizer.resolve("  Shortness of breath "),
            Some(("shortness_of_breath".into(), MatchKind::Exact))
        );
    }

    #[test]
    fn synonym_lookup() {
        let table = KnowledgeTable::builtin();
        let normalizer = SymptomNormalizer::new(&table);
        assert_eq!(
            normalizer.resolve("pyrexia"),
            Some(("fever".into(), MatchKind::Synonym))
        );
        assert_eq!(
            normalizer.resolve("sweating"),
            Some(("night_sweats".into(), MatchKind::Synonym))
        );
        assert_eq!(
            normalizer.resolve("severe tummy ache"),
            Some(("abdominal_pain".into(), MatchKind::Synonym))
        );
    }

    #[test]
    fn fuzzy_fallback() {
        let table = KnowledgeTable::builtin();
        let normalizer = SymptomNormalizer::new(&table);
        let (canonical, kind) = normalizer.resolve("headaches").unwrap();
        assert_eq!(canonical, "headache");
        assert_eq!(kind, MatchKind::Fuzzy);
    }

    #[test]
    fn gibberish_is_unmatched() {
        let table = KnowledgeTable::builtin();
        let normalizer = SymptomNormalizer::new(&table);
        assert_eq!(normalizer.resolve("xyzzy"), None);
        assert_eq!(normalizer.resolve("   "), None);

        let report = normalizer.normalize_with_report(&strings(&["xyzzy", "fever"]));
        assert_eq!(report.canonical, vec!["fever"]);
        assert_eq!(report.unmatched, vec!["xyzzy"]);
    }

    #[test]
    fn duplicates_collapse_in_order() {
        let table = KnowledgeTable::builtin();
        let normalizer = SymptomNormalizer::new(&table);
        let out = normalizer.normalize(&strings(&["chills", "fever", "pyrexia", "Chills"]));
        assert_eq!(out, vec!["chills", "fever"]);
    }

    #[test]
    fn lcs_lengths() {
        assert_eq!(longest_common_substring("night_sweats", "sweating"), 5);
        assert_eq!(longest_common_substring("abc", ""), 0);
        assert_eq!(longest_common_substring("fever", "fever"), 5);
    }

    #[test]
    fn fold_token_normalizes_separators() {
        assert_eq!(fold_token(" Right-Lower  Quadrant pain"), "right_lower_quadrant_pain");
    }
}
