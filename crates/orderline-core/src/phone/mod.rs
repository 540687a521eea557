//! Phone number normalization and extraction.
//!
//! A normalized number is a digit-only string that starts with a country
//! calling code (`60` for Malaysia, `65` for Singapore). Each numbering plan
//! has its own [`PhoneFormatter`]; [`PhoneResolver`] runs them in a fixed
//! priority order and takes the first answer.

mod malaysia;
mod singapore;

use std::sync::Arc;

use regex::Regex;

pub use malaysia::MalaysiaFormatter;
pub use singapore::SingaporeFormatter;

pub trait PhoneFormatter: Send + Sync {
    /// Calling code this formatter emits, e.g. `"60"`.
    fn country_code(&self) -> &'static str;

    /// Returns `None` when the input does not fit this numbering plan.
    fn normalize(&self, raw: &str) -> Option<String>;

    /// First match of this plan's patterns in free-form text, with internal
    /// whitespace removed. The result is not normalized.
    fn extract(&self, text: &str) -> Option<String>;
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Runs `patterns` in order and returns the first hit of the first pattern
/// that matches. Patterns carry a `phone` capture group so boundary context
/// can be matched without becoming part of the result.
pub(crate) fn first_pattern_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern.captures(text).and_then(|caps| {
            caps.name("phone").map(|m| {
                m.as_str()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
            })
        })
    })
}

/// Ordered list of regional formatters.
///
/// [`PhoneResolver::default`] tries Singapore before Malaysia: a Singapore
/// number has one exact shape (8 digits led by 3, 6, 8 or 9) while the
/// Malaysian rules accept 9 to 11 digit runs, so the narrower plan gets the
/// first look.
#[derive(Clone)]
pub struct PhoneResolver {
    formatters: Vec<Arc<dyn PhoneFormatter>>,
}

impl Default for PhoneResolver {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(SingaporeFormatter),
            Arc::new(MalaysiaFormatter),
        ])
    }
}

impl PhoneResolver {
    pub fn new(formatters: Vec<Arc<dyn PhoneFormatter>>) -> Self {
        Self { formatters }
    }

    /// Calling codes in the order they are tried.
    pub fn priority(&self) -> Vec<&'static str> {
        self.formatters.iter().map(|f| f.country_code()).collect()
    }

    /// Never fails: input no formatter recognizes is reduced to its digits.
    /// That fallback does not mean the number is valid; use
    /// [`PhoneResolver::try_normalize`] when that matters.
    pub fn normalize(&self, raw: &str) -> String {
        self.try_normalize(raw)
            .unwrap_or_else(|| digits_only(raw))
    }

    pub fn try_normalize(&self, raw: &str) -> Option<String> {
        self.formatters.iter().find_map(|f| f.normalize(raw))
    }

    /// Extracts and normalizes the first number found by the highest-priority
    /// formatter that finds one.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.formatters.iter().find_map(|formatter| {
            formatter.extract(text).map(|candidate| {
                formatter
                    .normalize(&candidate)
                    .unwrap_or_else(|| digits_only(&candidate))
            })
        })
    }
}
