//! Deterministic rule-based classification of issues into work types.

use crate::core::types::WorkType;

/// Label keywords in priority order. The first label that contains any keyword wins.
const LABEL_RULES: &[(&[&str], WorkType)] = &[
    (&["bug", "defect"], WorkType::Bug),
    (&["feature", "enhancement"], WorkType::Feature),
    (&["chore", "maintenance"], WorkType::Chore),
];

const DEFECT_WORDS: &[&str] = &["bug", "fix", "error"];
const MAINTENANCE_WORDS: &[&str] = &["chore", "refactor", "config"];

/// Classify an issue from its title, body and label names.
///
/// Labels take precedence over free text. Without a matching label the lowercased
/// title and body are scanned for defect words, then maintenance words. Anything
/// unmatched is treated as a feature.
pub fn classify_issue<S: AsRef<str>>(title: &str, body: &str, labels: &[S]) -> WorkType {
    for label in labels {
        let label = label.as_ref().to_lowercase();
        for (keywords, work_type) in LABEL_RULES {
            if keywords.iter().any(|keyword| label.contains(keyword)) {
                return *work_type;
            }
        }
    }

    let text = format!("{title} {body}").to_lowercase();
    if DEFECT_WORDS.iter().any(|word| text.contains(word)) {
        WorkType::Bug
    } else if MAINTENANCE_WORDS.iter().any(|word| text.contains(word)) {
        WorkType::Chore
    } else {
        WorkType::Feature
    }
}
