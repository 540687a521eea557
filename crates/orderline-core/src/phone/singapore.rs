use std::sync::LazyLock;

use regex::Regex;

use super::{PhoneFormatter, digits_only, first_pattern_match};

// The bare eight-digit pattern refuses a match whose only separator from the
// previous digit run is whitespace, so the tail of "012 3456 7890" is not
// mistaken for a Singapore number.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:^|[^\d+])(?P<phone>\+?65[\s-]?[3689]\d{3}[\s-]?\d{4})(?:\D|$)",
        r"(?:^|[^\d\s+\-])\s*(?P<phone>[3689]\d{3}[\s-]?\d{4})(?:\D|$)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid regex"))
    .collect()
});

/// Singapore numbering plan (`+65`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SingaporeFormatter;

impl PhoneFormatter for SingaporeFormatter {
    fn country_code(&self) -> &'static str {
        "65"
    }

    fn normalize(&self, raw: &str) -> Option<String> {
        let digits = digits_only(raw);

        if digits.starts_with("65") {
            return Some(digits);
        }

        let first = digits.chars().next()?;
        if digits.len() == 8 && matches!(first, '3' | '6' | '8' | '9') {
            return Some(format!("65{digits}"));
        }

        None
    }

    fn extract(&self, text: &str) -> Option<String> {
        first_pattern_match(&PATTERNS, text)
    }
}
