use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::rules::{compile, first_match, group_u32, Rule};
use crate::model::record::{ImageOcrMeta, IndicatorResult};

/// What the biological-indicator reader shows on its display.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttestReading {
    pub serial_number: Option<String>,
    pub reader_time: Option<String>,
    pub result: Option<IndicatorResult>,
}

impl AttestReading {
    pub fn ocr_meta(&self) -> ImageOcrMeta {
        ImageOcrMeta {
            serial_number: self.serial_number.clone(),
            reader_time: self.reader_time.clone(),
            duration: None,
            duration_seconds: None,
        }
    }
}

static SERIAL_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            r"(?i)(?:\bs/n|\bsn|\bserial(?:\s*(?:no|number|#))?)\b\.?\s*[:#.\-]*\s*([A-Za-z0-9][A-Za-z0-9\-]{2,})",
            serial,
        ),
        Rule::new(r"(?i)\blot\.?\s*[:#.\-]*\s*([A-Za-z0-9][A-Za-z0-9\-]{2,})", serial),
    ]
});

static TIME: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b"));

/// An explicitly labeled reading in words, e.g. `RESULT: NEG` or `RESULT - POSITIVE`.
static LABELED_WORD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\bresult\s*[:=\-]?\s*(positive|negative|pos|neg|pass|fail)\b")
});
/// A labeled `+` / `-` sign. It must end the line, so a dash separator is never
/// taken for a negative read.
static LABELED_SIGN: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?im)\bresult\s*[:=]?\s*(\+|-)[ \t]*$"));
static PASS_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(?:negative|neg|pass)\b"));
static FAIL_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(?:positive|pos|fail)\b"));

/// Extracts serial number, display time and the pass/fail marking from reader text.
///
/// A negative biological read means no surviving spores, i.e. a passing cycle.
/// Unlabeled text mentioning both outcomes yields no result.
pub fn extract_attest_reading(text: &str) -> AttestReading {
    AttestReading {
        serial_number: first_match(&SERIAL_RULES, text),
        reader_time: reader_time(text),
        result: reader_result(text),
    }
}

fn serial(caps: &Captures) -> Option<String> {
    let token = caps.get(1)?.as_str().trim_matches('-');
    (!token.is_empty()).then(|| token.to_ascii_uppercase())
}

fn reader_time(text: &str) -> Option<String> {
    TIME.as_ref()?.captures_iter(text).find_map(|caps| {
        let hours = group_u32(&caps, 1)?;
        let minutes = group_u32(&caps, 2)?;
        let seconds = match caps.get(3) {
            Some(_) => Some(group_u32(&caps, 3)?),
            None => None,
        };
        if hours >= 24 || minutes >= 60 || seconds.is_some_and(|s| s >= 60) {
            return None;
        }
        Some(match seconds {
            Some(s) => format!("{:02}:{:02}:{:02}", hours, minutes, s),
            None => format!("{:02}:{:02}", hours, minutes),
        })
    })
}

fn reader_result(text: &str) -> Option<IndicatorResult> {
    for labeled in [&*LABELED_WORD, &*LABELED_SIGN] {
        if let Some(caps) = labeled.as_ref().and_then(|re| re.captures(text)) {
            return marking(caps.get(1)?.as_str());
        }
    }
    let found = |re: &Option<Regex>| re.as_ref().is_some_and(|re| re.is_match(text));
    match (found(&*PASS_WORDS), found(&*FAIL_WORDS)) {
        (true, false) => Some(IndicatorResult::Pass),
        (false, true) => Some(IndicatorResult::Fail),
        _ => None,
    }
}

fn marking(token: &str) -> Option<IndicatorResult> {
    match token.to_ascii_lowercase().as_str() {
        "-" | "neg" | "negative" | "pass" => Some(IndicatorResult::Pass),
        "+" | "pos" | "positive" | "fail" => Some(IndicatorResult::Fail),
        _ => None,
    }
}
