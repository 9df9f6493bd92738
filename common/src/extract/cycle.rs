use regex::Captures;
use std::sync::LazyLock;

use super::rules::{first_match, Rule};

const TOKEN: &str = r"([A-Za-z0-9][A-Za-z0-9\-]*)";
/// Token that contains at least one digit, for labels that also occur in prose.
const NUMERIC_TOKEN: &str = r"([A-Za-z]*[0-9][A-Za-z0-9\-]*)";
const SEPARATOR: &str = r"\.?\s*[:#.\-]*\s*";

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let labeled = |label: &str, token: &str| format!(r"(?i)\b{label}{SEPARATOR}{token}");
    vec![
        Rule::new(&labeled(r"lo(?:ad|co)\s*code", TOKEN), load_code),
        Rule::new(&labeled(r"total\s+cycle\s+no", TOKEN), cycle_token),
        Rule::new(&labeled(r"cycle\s+nr", TOKEN), cycle_token),
        Rule::new(&labeled(r"number\s+of\s+cycles?", TOKEN), cycle_token),
        Rule::new(&labeled(r"model", TOKEN), cycle_token),
        Rule::new(&labeled(r"(?:cycle|no|nr)\b", NUMERIC_TOKEN), cycle_token),
        Rule::new(&format!(r"#\s*{NUMERIC_TOKEN}"), cycle_token),
    ]
});

/// Extracts the cycle / load identifier printed on a sterilizer slip.
///
/// Returns an empty string when no label is recognized.
pub fn extract_cycle_identifier(text: &str) -> String {
    first_match(&RULES, text).unwrap_or_default()
}

fn load_code(caps: &Captures) -> Option<String> {
    let token = caps.get(1)?.as_str().trim();
    Some(first_digit_run(token).unwrap_or_else(|| token.to_string()))
}

fn cycle_token(caps: &Captures) -> Option<String> {
    let token = caps.get(1)?.as_str().trim();
    Some(
        digits_then_letters(token)
            .or_else(|| first_digit_run(token))
            .unwrap_or_else(|| token.to_string()),
    )
}

fn first_digit_run(token: &str) -> Option<String> {
    let run: String = token
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    (!run.is_empty()).then_some(run)
}

/// First digit run directly followed by letters, letters upper-cased: `XK-300a` gives `300A`.
fn digits_then_letters(token: &str) -> Option<String> {
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let digits_end = i;
        while i < chars.len() && chars[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i > digits_end {
            let digits: String = chars[start..digits_end].iter().collect();
            let letters: String = chars[digits_end..i].iter().collect();
            return Some(digits + &letters.to_ascii_uppercase());
        }
    }
    None
}
