//! Aggregate statistics for the admin dashboard.
//!
//! Durations come from the OCR metadata of the slip photo. The extractor stores the
//! length in seconds next to the printed text, and that value is what gets averaged.
//! Without it only a plain minute count is trusted: an `A:B` clock alone does not
//! say whether it is hours or minutes. Durations that cannot be read are left out
//! of the averages and counted.

use common::model::record::{ImageOcrMeta, Program, RecordStatus, SterilizationRecord};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramStats {
    pub program: Program,
    pub cycles: usize,
    pub passed: usize,
    pub failed: usize,
    pub average_duration_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    /// `passed / (passed + failed)`; `None` while no cycle has a verdict.
    pub success_rate: Option<f64>,
    pub programs: Vec<ProgramStats>,
    pub unparsed_durations: usize,
}

/// Cycle length in minutes recorded in a slip's OCR metadata.
pub fn duration_minutes(meta: &ImageOcrMeta) -> Option<f64> {
    if let Some(seconds) = meta.duration_seconds {
        return Some(f64::from(seconds) / 60.0);
    }
    meta.duration
        .as_deref()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|minutes| minutes.is_finite() && *minutes >= 0.0)
}

fn rate(passed: usize, failed: usize) -> Option<f64> {
    let decided = passed + failed;
    (decided > 0).then(|| passed as f64 / decided as f64)
}

pub fn summarize(records: &[SterilizationRecord]) -> Analytics {
    let mut unparsed_durations = 0;
    let programs = Program::ALL
        .into_iter()
        .map(|program| {
            let cycles: Vec<&SterilizationRecord> =
                records.iter().filter(|r| r.program == program).collect();
            let mut durations = Vec::new();
            let metas = cycles
                .iter()
                .filter_map(|r| r.slip_image.as_ref().and_then(|img| img.ocr.as_ref()))
                .filter(|ocr| ocr.duration.is_some() || ocr.duration_seconds.is_some());
            for meta in metas {
                match duration_minutes(meta) {
                    Some(minutes) => durations.push(minutes),
                    None => unparsed_durations += 1,
                }
            }
            ProgramStats {
                program,
                cycles: cycles.len(),
                passed: cycles.iter().filter(|r| r.status == RecordStatus::Pass).count(),
                failed: cycles.iter().filter(|r| r.status == RecordStatus::Fail).count(),
                average_duration_minutes: (!durations.is_empty())
                    .then(|| durations.iter().sum::<f64>() / durations.len() as f64),
            }
        })
        .collect::<Vec<_>>();

    let passed = records.iter().filter(|r| r.status == RecordStatus::Pass).count();
    let failed = records.iter().filter(|r| r.status == RecordStatus::Fail).count();
    Analytics {
        total: records.len(),
        passed,
        failed,
        pending: records.len() - passed - failed,
        success_rate: rate(passed, failed),
        programs,
        unparsed_durations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use common::extract::extract_slip_fields;
    use common::model::record::{ImageRef, Indicators};

    fn record(program: Program, status: RecordStatus, duration: Option<&str>) -> SterilizationRecord {
        record_with(
            program,
            status,
            duration.map(|d| ImageOcrMeta {
                duration: Some(d.to_string()),
                ..ImageOcrMeta::default()
            }),
        )
    }

    fn record_with(
        program: Program,
        status: RecordStatus,
        ocr: Option<ImageOcrMeta>,
    ) -> SterilizationRecord {
        let now = Utc::now();
        SterilizationRecord {
            id: "r".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            sterilizer: "1".into(),
            program,
            indicators: Indicators::default(),
            status,
            slip_image: ocr.map(|meta| ImageRef {
                path: "slip/a.jpg".into(),
                url: "http://x/files/slip/a.jpg".into(),
                ocr: Some(meta),
            }),
            attest_image: None,
            equipment: Vec::new(),
            notes: String::new(),
            sterile_staff: String::new(),
            result_reader: String::new(),
            created_by: "u".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stored_seconds_win_over_the_printed_text() {
        let meta = ImageOcrMeta {
            duration: Some("1:30".into()),
            duration_seconds: Some(90 * 60),
            ..ImageOcrMeta::default()
        };
        assert_eq!(duration_minutes(&meta), Some(90.0));
    }

    #[test]
    fn test_text_alone_counts_only_as_plain_minutes() {
        let text = |d: &str| ImageOcrMeta {
            duration: Some(d.to_string()),
            ..ImageOcrMeta::default()
        };
        assert_eq!(duration_minutes(&text("45")), Some(45.0));
        assert_eq!(duration_minutes(&text("4:30")), None);
        assert_eq!(duration_minutes(&text("soon")), None);
        assert_eq!(duration_minutes(&ImageOcrMeta::default()), None);
    }

    #[test]
    fn test_extracted_durations_average_in_minutes_for_every_program() {
        let slip = |text: &str| Some(extract_slip_fields(text).ocr_meta());
        let records = vec![
            record_with(
                Program::Prevac,
                RecordStatus::Pass,
                slip("Start time 08:00\nStop time 09:30"),
            ),
            record_with(Program::Prevac, RecordStatus::Pass, slip("TOTAL TIME: 30 MIN")),
            record_with(Program::Eo, RecordStatus::Pass, slip("Total time = 47.5 min")),
        ];
        let analytics = summarize(&records);
        let average = |program: Program| {
            analytics
                .programs
                .iter()
                .find(|p| p.program == program)
                .and_then(|p| p.average_duration_minutes)
        };
        assert_eq!(average(Program::Prevac), Some(60.0));
        assert_eq!(average(Program::Eo), Some(47.5));
        assert_eq!(analytics.unparsed_durations, 0);
    }

    #[test]
    fn test_success_rate_ignores_pending_records() {
        let records = vec![
            record(Program::Prevac, RecordStatus::Pass, None),
            record(Program::Prevac, RecordStatus::Fail, None),
            record(Program::Plasma, RecordStatus::Pass, None),
            record(Program::Plasma, RecordStatus::None, None),
            record(Program::Eo, RecordStatus::None, None),
        ];
        let analytics = summarize(&records);
        assert_eq!(analytics.total, 5);
        assert_eq!(analytics.pending, 2);
        let rate = analytics.success_rate.unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_decided_cycles_has_no_rate() {
        let analytics = summarize(&[record(Program::Eo, RecordStatus::None, None)]);
        assert_eq!(analytics.success_rate, None);
        assert_eq!(summarize(&[]).success_rate, None);
    }

    #[test]
    fn test_program_averages_and_unparsed_count() {
        let records = vec![
            record(Program::Eo, RecordStatus::Pass, Some("120")),
            record(Program::Eo, RecordStatus::Pass, Some("180")),
            record(Program::Prevac, RecordStatus::Pass, Some("45")),
            record(Program::Prevac, RecordStatus::Pass, Some("??")),
            record(Program::Prevac, RecordStatus::Pass, Some("2:00")),
        ];
        let analytics = summarize(&records);
        let eo = analytics
            .programs
            .iter()
            .find(|p| p.program == Program::Eo)
            .unwrap();
        assert_eq!(eo.cycles, 2);
        assert_eq!(eo.average_duration_minutes, Some(150.0));
        let prevac = analytics
            .programs
            .iter()
            .find(|p| p.program == Program::Prevac)
            .unwrap();
        assert_eq!(prevac.average_duration_minutes, Some(45.0));
        assert_eq!(analytics.unparsed_durations, 2);
        let bowie = analytics
            .programs
            .iter()
            .find(|p| p.program == Program::Bowie)
            .unwrap();
        assert_eq!(bowie.average_duration_minutes, None);
    }
}
