//! Field extraction from OCR text of sterilizer slips and biological reader photos.
//!
//! OCR output is noisy, so every extractor is best effort: each one walks an ordered
//! list of `(pattern, extractor)` rules and stops at the first that yields a value.
//! A field that cannot be found comes back as an empty string or `None`, never as
//! an error, so a blurry photo never blocks saving a record.

mod attest;
mod cycle;
mod date;
mod duration;
mod rules;

use serde::{Deserialize, Serialize};

use crate::model::record::ImageOcrMeta;

pub use attest::{extract_attest_reading, AttestReading};
pub use cycle::extract_cycle_identifier;
pub use date::{extract_date, extract_date_on};
pub use duration::{extract_total_duration, read_total_duration, DurationForm, TotalDuration};

/// Candidate values read from a sterilizer slip.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    /// Cycle / load identifier; empty when not found.
    pub cycle_identifier: String,
    pub total_duration: Option<String>,
    /// `total_duration` in seconds, whatever form it was printed in.
    pub duration_seconds: Option<u32>,
    /// `YYYY/MM/DD`.
    pub date: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.cycle_identifier.is_empty() && self.total_duration.is_none() && self.date.is_none()
    }

    pub fn ocr_meta(&self) -> ImageOcrMeta {
        ImageOcrMeta {
            serial_number: None,
            reader_time: None,
            duration: self.total_duration.clone(),
            duration_seconds: self.duration_seconds,
        }
    }
}

/// Runs the three slip extractors over `text`.
pub fn extract_slip_fields(text: &str) -> ExtractedFields {
    let duration = read_total_duration(text);
    ExtractedFields {
        cycle_identifier: extract_cycle_identifier(text),
        total_duration: duration.map(|d| d.to_string()),
        duration_seconds: duration.map(|d| d.seconds),
        date: extract_date(text),
    }
}
