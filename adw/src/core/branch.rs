//! Branch name derivation from issue metadata.

use unicode_normalization::UnicodeNormalization;

use crate::core::types::WorkType;

/// Maximum length of the title-derived slug.
pub const MAX_SLUG_LEN: usize = 30;

/// Derive a URL- and ref-safe slug from an issue title.
///
/// Accents are stripped through NFKD decomposition, characters outside
/// `[a-z0-9_ -]` are dropped, and runs of whitespace, hyphens or underscores
/// collapse into a single hyphen. The result never starts or ends with a hyphen
/// and is cut at [`MAX_SLUG_LEN`] bytes, possibly mid-word.
pub fn slugify(title: &str) -> String {
    let folded: String = title
        .nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_separator = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c.is_ascii_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
        }
    }

    // Slug is pure ASCII here, so byte truncation is safe.
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Build `<prefix>-<issue>-<slug>` for the given work type.
///
/// Titles that slugify to nothing yield `<prefix>-<issue>`.
pub fn branch_name(issue_number: u64, title: &str, work_type: WorkType) -> String {
    let prefix = work_type.branch_prefix();
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{prefix}-{issue_number}")
    } else {
        format!("{prefix}-{issue_number}-{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AWKWARD_TITLES: &[&str] = &[
        "",
        "   ",
        "---",
        "Add dark mode",
        "Fix: crash in __init__ when path has   spaces",
        "Ünïcödé Çafé résumé naïve",
        "日本語のタイトル",
        "Emoji 🚀 launch -- now!!!",
        "a-very-long-title-that-definitely-exceeds-the-thirty-character-limit",
        "trailing hyphen at the cut point x-yyyyyyyyyyyy",
        "Tabs\tand\nnewlines",
        "UPPER_snake_CASE",
    ];

    #[test]
    fn slug_properties_hold_for_awkward_titles() {
        for title in AWKWARD_TITLES {
            let slug = slugify(title);
            assert!(slug.len() <= MAX_SLUG_LEN, "too long: {slug:?}");
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "bad chars: {slug:?}"
            );
            assert!(!slug.starts_with('-'), "leading hyphen: {slug:?}");
            assert!(!slug.ends_with('-'), "trailing hyphen: {slug:?}");
            assert!(!slug.contains("--"), "double hyphen: {slug:?}");
        }
    }

    #[test]
    fn slug_strips_accents() {
        assert_eq!(slugify("Café résumé"), "cafe-resume");
    }

    #[test]
    fn slug_drops_punctuation_without_separating() {
        assert_eq!(slugify("Don't break (again)!"), "dont-break-again");
    }

    #[test]
    fn slug_truncates_mid_word() {
        let slug = slugify("Implement the extraordinarily complicated feature");
        assert_eq!(slug, "implement-the-extraordinarily");
        assert_eq!(slugify("abcdefghij abcdefghij abcdefghijklmnop"), "abcdefghij-abcdefghij-abcdefgh");
    }

    #[test]
    fn branch_name_uses_work_type_prefix() {
        assert!(branch_name(42, "Fix Login Bug", WorkType::Bug).starts_with("fix-42-"));
        assert_eq!(
            branch_name(7, "Add dark mode", WorkType::Feature),
            "feat-7-add-dark-mode"
        );
        assert_eq!(
            branch_name(3, "Bump deps", WorkType::Chore),
            "chore-3-bump-deps"
        );
    }

    #[test]
    fn branch_name_without_slug_omits_trailing_segment() {
        assert_eq!(branch_name(9, "!!!", WorkType::Feature), "feat-9");
    }
}
