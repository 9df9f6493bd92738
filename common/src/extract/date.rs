use chrono::{Datelike, NaiveDate, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::rules::compile;

/// Field order of a date pattern's three capture groups.
#[derive(Clone, Copy)]
enum Order {
    YearMonthDay,
    DayMonthYear,
}

struct DatePattern {
    pattern: Option<Regex>,
    order: Order,
}

static STRUCTURED: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    let sep = r"[/.\-]";
    [
        (format!(r"\b(\d{{4}}){sep}(\d{{1,2}}){sep}(\d{{1,2}})\b"), Order::YearMonthDay),
        (format!(r"\b(\d{{1,2}}){sep}(\d{{1,2}}){sep}(\d{{4}})\b"), Order::DayMonthYear),
        (format!(r"\b(\d{{1,2}}){sep}(\d{{1,2}}){sep}(\d{{2}})\b"), Order::DayMonthYear),
        (
            format!(r"(?i)\bdate\s*[:.]?\s*(\d{{1,2}}){sep}(\d{{1,2}}){sep}(\d{{2,4}})\b"),
            Order::DayMonthYear,
        ),
    ]
    .into_iter()
    .map(|(pattern, order)| DatePattern {
        pattern: compile(&pattern),
        order,
    })
    .collect()
});

/// Day and month, optionally a two-digit year.
static LOOSE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}))?\b"));

/// Extracts the most recent calendar date printed in `text`, as `YYYY/MM/DD`.
pub fn extract_date(text: &str) -> Option<String> {
    extract_date_on(text, Utc::now().date_naive())
}

/// Same as [`extract_date`], with two-digit years and missing years resolved
/// against `today`.
///
/// Every structurally valid candidate is collected and the latest one wins: a
/// printout stamps the newest date last, but OCR line order is not reliable.
pub fn extract_date_on(text: &str, today: NaiveDate) -> Option<String> {
    let mut candidates: Vec<NaiveDate> = STRUCTURED
        .iter()
        .filter_map(|p| p.pattern.as_ref().map(|re| (re, p.order)))
        .flat_map(|(re, order)| {
            re.captures_iter(text)
                .filter_map(move |caps| structured_date(&caps, order, today))
        })
        .collect();

    if candidates.is_empty() {
        if let Some(re) = LOOSE.as_ref() {
            candidates.extend(re.captures_iter(text).filter_map(|caps| loose_date(&caps, today)));
        }
    }

    candidates
        .into_iter()
        .max()
        .map(|date| date.format("%Y/%m/%d").to_string())
}

fn structured_date(caps: &Captures, order: Order, today: NaiveDate) -> Option<NaiveDate> {
    let (year, month, day) = match order {
        Order::YearMonthDay => (caps.get(1)?, caps.get(2)?, caps.get(3)?),
        Order::DayMonthYear => (caps.get(3)?, caps.get(2)?, caps.get(1)?),
    };
    let year = expand_year(year.as_str(), today)?;
    NaiveDate::from_ymd_opt(year, month.as_str().parse().ok()?, day.as_str().parse().ok()?)
}

fn loose_date(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let year = match caps.get(3) {
        Some(y) => expand_year(y.as_str(), today)?,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(
        year,
        caps.get(2)?.as_str().parse().ok()?,
        caps.get(1)?.as_str().parse().ok()?,
    )
}

/// Four-digit years pass through. Two-digit years land in the current century,
/// or the previous one when that would put them more than 50 years ahead.
fn expand_year(raw: &str, today: NaiveDate) -> Option<i32> {
    let value: i32 = raw.parse().ok()?;
    match raw.len() {
        4 => Some(value),
        2 => {
            let current = today.year();
            let year = current - current.rem_euclid(100) + value;
            Some(if year > current + 50 { year - 100 } else { year })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_latest_candidate_wins_over_text_order() {
        assert_eq!(
            extract_date_on("DATE: 15/03/24 ... 2024-01-01", today()),
            Some("2024/03/15".to_string())
        );
        assert_eq!(
            extract_date_on("2024-05-01 ... DATE: 15/03/24", today()),
            Some("2024/05/01".to_string())
        );
    }

    #[test]
    fn test_four_digit_day_month_year() {
        assert_eq!(
            extract_date_on("Printed 03.11.2025 14:02", today()),
            Some("2025/11/03".to_string())
        );
    }

    #[test]
    fn test_invalid_calendar_dates_are_rejected() {
        assert_eq!(extract_date_on("31/02/2024", today()), None);
        assert_eq!(extract_date_on("2024/13/45", today()), None);
    }

    #[test]
    fn test_two_digit_year_prefers_closest_century() {
        assert_eq!(expand_year("24", today()), Some(2024));
        assert_eq!(expand_year("76", today()), Some(2076));
        assert_eq!(expand_year("77", today()), Some(1977));
        assert_eq!(expand_year("999", today()), None);
    }

    #[test]
    fn test_loose_day_month_uses_current_year() {
        assert_eq!(
            extract_date_on("load 7/9 done", today()),
            Some("2026/09/07".to_string())
        );
    }

    #[test]
    fn test_loose_scan_is_only_a_fallback() {
        assert_eq!(
            extract_date_on("7/9 then 2020-01-02", today()),
            Some("2020/01/02".to_string())
        );
    }

    #[test]
    fn test_no_date_is_none() {
        assert_eq!(extract_date_on("no date on this slip", today()), None);
        assert_eq!(extract_date_on("08:00 09:30", today()), None);
    }
}
