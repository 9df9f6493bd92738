//! # Image Upload Service
//!
//! `POST /api/images/{slot}` takes a multipart form with a `file` part (the photo)
//! and an optional `json` part holding the chemical indicator values currently shown
//! to the operator. The photo is stored in the blob store and analyzed:
//!
//! - `slip`: OCR text runs through the slip field extractor and the strip colors
//!   produce a chemical indicator suggestion.
//! - `attest`: OCR text of the biological reader display yields the serial number,
//!   reader time and a `bio_test` suggestion.
//!
//! Nothing is written to a record here; the client merges the answer into its form
//! and saves through the action API.

mod upload;

use actix_web::http::Method;
use actix_web::web::{post, route, scope};
use actix_web::Scope;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::services::cors;

const API_PATH: &str = "/api/images";

/// Which photo of a record an upload is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSlot {
    Slip,
    Attest,
}

impl ImageSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSlot::Slip => "slip",
            ImageSlot::Attest => "attest",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slip" => Ok(ImageSlot::Slip),
            "attest" => Ok(ImageSlot::Attest),
            other => Err(format!("unknown image slot '{}'", other)),
        }
    }
}

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/{slot}", post().to(upload::process))
        .route("/{slot}", route().method(Method::OPTIONS).to(cors::preflight))
}
