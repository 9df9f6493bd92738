//! Ordered `(pattern, extractor)` rules shared by the slip and reader extractors.

use regex::{Captures, Regex};

/// Turns the captures of a successful match into a field value. Returning `None`
/// lets the next rule try.
pub(crate) type Extractor<T> = fn(&Captures) -> Option<T>;

pub(crate) struct Rule<T = String> {
    pattern: Option<Regex>,
    extract: Extractor<T>,
}

impl<T> Rule<T> {
    pub(crate) fn new(pattern: &str, extract: Extractor<T>) -> Self {
        Rule {
            pattern: compile(pattern),
            extract,
        }
    }
}

/// Compiles a built-in pattern. A pattern that fails to compile disables its rule
/// instead of taking the caller down.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("invalid extraction pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Evaluates `rules` in order and returns the value of the first one that both
/// matches and extracts.
pub(crate) fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<T> {
    rules.iter().find_map(|rule| {
        let caps = rule.pattern.as_ref()?.captures(text)?;
        (rule.extract)(&caps)
    })
}

/// Parses capture group `idx` as an unsigned number.
pub(crate) fn group_u32(caps: &Captures, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}
