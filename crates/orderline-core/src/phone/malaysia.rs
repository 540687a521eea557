use std::sync::LazyLock;

use regex::Regex;

use super::{PhoneFormatter, digits_only, first_pattern_match};

// Longest and most explicit layouts first; the local landline form is the
// loosest and goes last.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:^|[^\d+])(?P<phone>\+?60[\s-]?1\d[\s-]?\d{3,4}[\s-]?\d{4})(?:\D|$)",
        r"(?:^|[^\d+])(?P<phone>01\d[\s-]?\d{3,4}[\s-]?\d{4})(?:\D|$)",
        r"(?:^|[^\d+])(?P<phone>\+?60[\s-]?[3-9][\s-]?\d{3,4}[\s-]?\d{4})(?:\D|$)",
        r"(?:^|[^\d+])(?P<phone>0[3-9][\s-]?\d{3,4}[\s-]?\d{4})(?:\D|$)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid regex"))
    .collect()
});

/// Malaysian numbering plan (`+60`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MalaysiaFormatter;

impl PhoneFormatter for MalaysiaFormatter {
    fn country_code(&self) -> &'static str {
        "60"
    }

    fn normalize(&self, raw: &str) -> Option<String> {
        let digits = digits_only(raw);

        // International access prefix, e.g. 0060 12 345 6789.
        if let Some(international) = digits.strip_prefix("00") {
            return international
                .starts_with("60")
                .then(|| international.to_string());
        }

        if digits.starts_with("60") {
            return Some(digits);
        }

        if let Some(rest) = digits.strip_prefix('0') {
            if rest.is_empty() {
                return None;
            }
            return Some(format!("60{rest}"));
        }

        // Bare subscriber number without the trunk 0. No Malaysian range
        // starts with 2.
        let first = digits.chars().next()?;
        if (9..=11).contains(&digits.len()) && matches!(first, '1' | '3'..='9') {
            return Some(format!("60{digits}"));
        }

        None
    }

    fn extract(&self, text: &str) -> Option<String> {
        first_pattern_match(&PATTERNS, text)
    }
}
