//! Sterilization cycle records as they travel between the store, the HTTP API and
//! the browser.
//!
//! A `SterilizationRecord` is one row per cycle. The four sub-phase flags of the
//! paper form (`prevac`, `c134c`, `s9`, `d20`) are not stored: they are a function of
//! `program` and are produced on read by `Program::phases`, so they can never drift
//! from the selected program.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sterilization program run by the device for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Program {
    #[serde(rename = "PREVAC")]
    Prevac,
    #[serde(rename = "BOWIE")]
    Bowie,
    Plasma,
    #[serde(rename = "EO")]
    Eo,
}

impl Program {
    pub const ALL: [Program; 4] = [Program::Prevac, Program::Bowie, Program::Plasma, Program::Eo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Prevac => "PREVAC",
            Program::Bowie => "BOWIE",
            Program::Plasma => "Plasma",
            Program::Eo => "EO",
        }
    }

    /// Sub-phase flags implied by the program. Steam programs run every phase.
    pub fn phases(&self) -> SubPhases {
        let steam = matches!(self, Program::Prevac | Program::Bowie);
        SubPhases {
            prevac: steam,
            c134c: steam,
            s9: steam,
            d20: steam,
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Program {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Program::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown program '{}'", s))
    }
}

/// Derived sub-phase flags, emitted next to every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubPhases {
    pub prevac: bool,
    pub c134c: bool,
    pub s9: bool,
    pub d20: bool,
}

/// Read result of a single indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorResult {
    Pass,
    Fail,
}

impl IndicatorResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorResult::Pass => "pass",
            IndicatorResult::Fail => "fail",
        }
    }
}

impl FromStr for IndicatorResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(IndicatorResult::Pass),
            "fail" => Ok(IndicatorResult::Fail),
            other => Err(format!("unknown indicator result '{}'", other)),
        }
    }
}

/// The four independent test indicators of a cycle.
///
/// Browsers send an unset indicator as `""`, `null` or leave it out; all three
/// deserialize to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub mechanical: Option<IndicatorResult>,
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub chemical_external: Option<IndicatorResult>,
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub chemical_internal: Option<IndicatorResult>,
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub bio_test: Option<IndicatorResult>,
}

impl Indicators {
    pub fn iter(&self) -> impl Iterator<Item = Option<IndicatorResult>> {
        [
            self.mechanical,
            self.chemical_external,
            self.chemical_internal,
            self.bio_test,
        ]
        .into_iter()
    }

    /// True when any of the slip-backed indicators carries a result.
    pub fn has_slip_result(&self) -> bool {
        self.mechanical.is_some()
            || self.chemical_external.is_some()
            || self.chemical_internal.is_some()
    }
}

pub(crate) fn indicator_or_unset<'de, D>(deserializer: D) -> Result<Option<IndicatorResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Overall cycle status, always derived from the indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    Pass,
    Fail,
    #[default]
    None,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pass => "PASS",
            RecordStatus::Fail => "FAIL",
            RecordStatus::None => "NONE",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(RecordStatus::Pass),
            "FAIL" => Ok(RecordStatus::Fail),
            "NONE" => Ok(RecordStatus::None),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// OCR metadata kept alongside a stored photo.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageOcrMeta {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub reader_time: Option<String>,
    /// Total duration as printed on the slip.
    #[serde(default)]
    pub duration: Option<String>,
    /// The same duration in seconds. Unset for hand-entered values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

/// Reference to a photo held by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path inside the blob store, used for deletion.
    pub path: String,
    /// Public download URL.
    pub url: String,
    #[serde(default)]
    pub ocr: Option<ImageOcrMeta>,
}

/// One line of the equipment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub name: String,
    pub quantity: u32,
}

/// Editable part of a record, as submitted by the load-in form and the edit modal.
///
/// There is deliberately no `status` field: any status a client sends is dropped by
/// serde and the store derives it from `indicators`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInput {
    #[serde(with = "record_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub sterilizer: String,
    pub program: Program,
    #[serde(flatten)]
    pub indicators: Indicators,
    #[serde(default)]
    pub slip_image: Option<ImageRef>,
    #[serde(default)]
    pub attest_image: Option<ImageRef>,
    #[serde(default)]
    pub equipment: Vec<EquipmentItem>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub sterile_staff: String,
    #[serde(default)]
    pub result_reader: String,
}

impl RecordInput {
    /// Checks the field-level invariants of a submitted record.
    pub fn validate(&self) -> Result<(), String> {
        if self.indicators.has_slip_result() && self.slip_image.is_none() {
            return Err(
                "mechanical and chemical indicators require an attached slip image".to_string(),
            );
        }
        if self.indicators.bio_test.is_some() && self.attest_image.is_none() {
            return Err("bio_test requires an attached attest reader image".to_string());
        }
        for (idx, item) in self.equipment.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(format!("equipment line {} has an empty name", idx + 1));
            }
            if item.quantity == 0 {
                return Err(format!("equipment line {} has a zero quantity", idx + 1));
            }
        }
        Ok(())
    }
}

/// A persisted sterilization cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SterilizationRecord {
    pub id: String,
    #[serde(with = "record_date")]
    pub date: NaiveDate,
    pub sterilizer: String,
    pub program: Program,
    #[serde(flatten)]
    pub indicators: Indicators,
    pub status: RecordStatus,
    pub slip_image: Option<ImageRef>,
    pub attest_image: Option<ImageRef>,
    pub equipment: Vec<EquipmentItem>,
    pub notes: String,
    pub sterile_staff: String,
    pub result_reader: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SterilizationRecord {
    pub fn phases(&self) -> SubPhases {
        self.program.phases()
    }

    /// Attached photos, slip first.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.slip_image.iter().chain(self.attest_image.iter())
    }
}

/// Response shape of a record: the stored fields plus the derived sub-phases.
#[derive(Debug, Serialize)]
pub struct RecordView<'a> {
    #[serde(flatten)]
    pub record: &'a SterilizationRecord,
    pub phases: SubPhases,
}

impl<'a> From<&'a SterilizationRecord> for RecordView<'a> {
    fn from(record: &'a SterilizationRecord) -> Self {
        RecordView {
            record,
            phases: record.phases(),
        }
    }
}

/// Serde adapter for cycle dates: writes `YYYY-MM-DD`, reads `YYYY-MM-DD` or the
/// `YYYY/MM/DD` form produced by the OCR date extractor.
pub mod record_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
            .ok()
    }
}
