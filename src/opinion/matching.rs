use crate::knowledge::normalize::fold_token;
use crate::knowledge::KnowledgeTable;

/// Map a free-text disease name onto a canonical disease code.
///
/// Precedence: exact code, then display-name equality (both folded), then
/// the longest word-bounded occurrence of a code or display name inside the
/// text. Equal-length occurrences resolve to the first code in sorted order.
pub fn resolve_disease_code(table: &KnowledgeTable, text: &str) -> Option<String> {
    let folded = fold_token(text);
    if folded.is_empty() {
        return None;
    }
    if table.contains_disease(&folded) {
        return Some(folded);
    }

    if let Some(code) = table
        .disease_codes()
        .find(|code| fold_token(&table.display_name(code)) == folded)
    {
        return Some(code.to_string());
    }

    let haystack = spaced(text);
    let mut best: Option<(usize, &str)> = None;
    for code in table.disease_codes() {
        for needle in [spaced(code), spaced(&table.display_name(code))] {
            if needle.is_empty() || !contains_word(&haystack, &needle) {
                continue;
            }
            if best.map_or(true, |(len, _)| needle.len() > len) {
                best = Some((needle.len(), code));
            }
        }
    }
    best.map(|(_, code)| code.to_string())
}

/// Lowercase with `_` and `-` turned into spaces.
fn spaced(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}

/// Whether `needle` occurs in `haystack` bounded by non-alphanumerics.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str) -> Option<String> {
        resolve_disease_code(&KnowledgeTable::builtin(), text)
    }

    #[test]
    fn exact_code_and_display_name() {
        assert_eq!(resolve("malaria").as_deref(), Some("malaria"));
        assert_eq!(resolve("Lung Cancer").as_deref(), Some("lung_cancer"));
        assert_eq!(resolve("Rotavirus Infection").as_deref(), Some("rotavirus"));
        assert_eq!(resolve("whooping-cough").as_deref(), Some("whooping_cough"));
    }

    #[test]
    fn finds_disease_inside_sentence() {
        assert_eq!(
            resolve("Suspected Plasmodium falciparum malaria").as_deref(),
            Some("malaria")
        );
        assert_eq!(
            resolve("Community-acquired pneumonia, right lower lobe").as_deref(),
            Some("pneumonia")
        );
        assert_eq!(resolve("Acute hepatitis A infection").as_deref(), Some("hepatitis_a"));
    }

    #[test]
    fn longest_occurrence_wins() {
        assert_eq!(
            resolve("Rotavirus gastroenteritis").as_deref(),
            Some("gastroenteritis")
        );
    }

    #[test]
    fn requires_word_boundaries() {
        assert_eq!(resolve("pneumonias"), None);
        assert_eq!(resolve("bronchopneumonia"), None);
        assert_eq!(resolve("Viral fever"), None);
        assert_eq!(resolve("   "), None);
    }
}
