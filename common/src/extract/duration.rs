use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

use super::rules::{compile, first_match, group_u32, Rule};

const LABEL: &str = r"(?:total\s+duration|elapsed\s+time|total\s+time)";

/// How a duration was printed, which decides how its text reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationForm {
    /// Whole minutes, `"45"`.
    Minutes,
    /// `"M:SS"`.
    MinutesSeconds,
    /// `"H:MM"`.
    HoursMinutes,
}

/// A cycle length read from a slip, kept in seconds together with its printed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalDuration {
    pub seconds: u32,
    pub form: DurationForm,
}

impl TotalDuration {
    fn new(seconds: u32, form: DurationForm) -> Self {
        TotalDuration { seconds, form }
    }

    pub fn minutes(&self) -> f64 {
        f64::from(self.seconds) / 60.0
    }
}

impl fmt::Display for TotalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.form {
            DurationForm::Minutes => write!(f, "{}", self.seconds / 60),
            DurationForm::MinutesSeconds => {
                write!(f, "{}:{:02}", self.seconds / 60, self.seconds % 60)
            }
            DurationForm::HoursMinutes => {
                let minutes = self.seconds / 60;
                write!(f, "{}:{:02}", minutes / 60, minutes % 60)
            }
        }
    }
}

/// Device-specific phrases carrying a whole minute count.
static FIXED_RULES: LazyLock<Vec<Rule<TotalDuration>>> = LazyLock::new(|| {
    vec![
        Rule::new(r"(?i)\btotal\s+time\s*:\s*(\d+)\s*min", whole_minutes),
        Rule::new(r"(?i)\btotal\s+duration\s*:\s*(\d+)\s*min\.?", whole_minutes),
    ]
});

/// Generic labels followed by a clock, compound or fractional duration.
static GENERIC_RULES: LazyLock<Vec<Rule<TotalDuration>>> = LazyLock::new(|| {
    vec![
        Rule::new(
            &format!(r"(?i)\b{LABEL}\s*[:=]?\s*(\d{{1,2}}):(\d{{2}})\b"),
            clock,
        ),
        Rule::new(
            &format!(r"(?i)\b{LABEL}\s*[:=]?\s*(\d+)\s*m\s*(\d{{1,2}})\s*s\b"),
            minutes_seconds,
        ),
        Rule::new(
            &format!(r"(?i)\b{LABEL}\s*[:=]?\s*(\d+(?:[.,]\d+)?)\s*(?:min|m)\b"),
            fractional_minutes,
        ),
    ]
});

static START: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\bstart(?:ing)?\s*time\s*[:=]?\s*(\d{1,2}):(\d{2})"));
static STOP: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(?:stop|end)\s*time\s*[:=]?\s*(\d{1,2}):(\d{2})"));

/// Extracts the total cycle duration from slip text.
///
/// Fixed device phrases yield a plain minute count (`"45"`), generic labels yield
/// `H:MM` clocks as printed and `M:SS` for compound or fractional minutes, and
/// explicit start/stop clocks yield their difference (`H:MM`, or plain minutes under
/// an hour). `None` when nothing is recognized.
pub fn extract_total_duration(text: &str) -> Option<String> {
    read_total_duration(text).map(|duration| duration.to_string())
}

/// Same cascade as [`extract_total_duration`], keeping the unit of the match.
pub fn read_total_duration(text: &str) -> Option<TotalDuration> {
    first_match(&FIXED_RULES, text)
        .or_else(|| first_match(&GENERIC_RULES, text))
        .or_else(|| start_stop_difference(text))
}

fn whole_minutes(caps: &Captures) -> Option<TotalDuration> {
    let minutes = group_u32(caps, 1)?;
    Some(TotalDuration::new(minutes.checked_mul(60)?, DurationForm::Minutes))
}

fn clock(caps: &Captures) -> Option<TotalDuration> {
    let hours = group_u32(caps, 1)?;
    let minutes = group_u32(caps, 2)?;
    (minutes < 60).then(|| TotalDuration::new((hours * 60 + minutes) * 60, DurationForm::HoursMinutes))
}

fn minutes_seconds(caps: &Captures) -> Option<TotalDuration> {
    let minutes = group_u32(caps, 1)?;
    let seconds = group_u32(caps, 2)?;
    if seconds >= 60 {
        return None;
    }
    let total = minutes.checked_mul(60)?.checked_add(seconds)?;
    Some(TotalDuration::new(total, DurationForm::MinutesSeconds))
}

fn fractional_minutes(caps: &Captures) -> Option<TotalDuration> {
    let value: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let minutes = value.floor();
    let seconds = ((value - minutes) * 60.0).round();
    let total = minutes * 60.0 + seconds;
    (total.is_finite() && total <= f64::from(u32::MAX))
        .then(|| TotalDuration::new(total as u32, DurationForm::MinutesSeconds))
}

fn clock_minutes(re: &Option<Regex>, text: &str) -> Option<u32> {
    let caps = re.as_ref()?.captures(text)?;
    let hours = group_u32(&caps, 1)?;
    let minutes = group_u32(&caps, 2)?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

fn start_stop_difference(text: &str) -> Option<TotalDuration> {
    let start = clock_minutes(&START, text)?;
    let stop = clock_minutes(&STOP, text)?;
    let elapsed = if stop >= start {
        stop - start
    } else {
        stop + 24 * 60 - start
    };
    let form = if elapsed >= 60 {
        DurationForm::HoursMinutes
    } else {
        DurationForm::Minutes
    };
    Some(TotalDuration::new(elapsed * 60, form))
}
