//! Overall cycle status.
//!
//! `compute_status` is the only place a `RecordStatus` is derived. The store calls it
//! on create and on update, so the persisted status always agrees with the four
//! indicator fields.

use crate::model::record::{IndicatorResult, Indicators, RecordStatus};

/// Derives PASS / FAIL / NONE from the four indicators.
///
/// - no indicator set: `NONE`
/// - any indicator `fail`: `FAIL`
/// - otherwise: `PASS`
pub fn compute_status(indicators: &Indicators) -> RecordStatus {
    let mut any_set = false;
    for value in indicators.iter() {
        match value {
            Some(IndicatorResult::Fail) => return RecordStatus::Fail,
            Some(IndicatorResult::Pass) => any_set = true,
            None => {}
        }
    }
    if any_set {
        RecordStatus::Pass
    } else {
        RecordStatus::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [Option<IndicatorResult>; 3] =
        [None, Some(IndicatorResult::Pass), Some(IndicatorResult::Fail)];

    fn all_combinations() -> Vec<Indicators> {
        let mut out = Vec::with_capacity(81);
        for mechanical in VALUES {
            for chemical_external in VALUES {
                for chemical_internal in VALUES {
                    for bio_test in VALUES {
                        out.push(Indicators {
                            mechanical,
                            chemical_external,
                            chemical_internal,
                            bio_test,
                        });
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_no_indicator_set_is_none() {
        assert_eq!(compute_status(&Indicators::default()), RecordStatus::None);
    }

    #[test]
    fn test_fail_dominates_pass() {
        let indicators = Indicators {
            mechanical: Some(IndicatorResult::Pass),
            chemical_external: Some(IndicatorResult::Pass),
            chemical_internal: Some(IndicatorResult::Pass),
            bio_test: Some(IndicatorResult::Fail),
        };
        assert_eq!(compute_status(&indicators), RecordStatus::Fail);
    }

    #[test]
    fn test_single_pass_is_pass() {
        let indicators = Indicators {
            chemical_internal: Some(IndicatorResult::Pass),
            ..Indicators::default()
        };
        assert_eq!(compute_status(&indicators), RecordStatus::Pass);
    }

    #[test]
    fn test_every_combination_matches_rules() {
        for indicators in all_combinations() {
            let values: Vec<_> = indicators.iter().collect();
            let expected = if values.iter().all(Option::is_none) {
                RecordStatus::None
            } else if values.contains(&Some(IndicatorResult::Fail)) {
                RecordStatus::Fail
            } else {
                RecordStatus::Pass
            };
            assert_eq!(compute_status(&indicators), expected, "{:?}", indicators);
        }
    }

    #[test]
    fn test_status_does_not_depend_on_indicator_position() {
        // Same multiset of values in every slot order must give the same status.
        for indicators in all_combinations() {
            let rotated = Indicators {
                mechanical: indicators.bio_test,
                chemical_external: indicators.mechanical,
                chemical_internal: indicators.chemical_external,
                bio_test: indicators.chemical_internal,
            };
            assert_eq!(compute_status(&indicators), compute_status(&rotated));
        }
    }
}
