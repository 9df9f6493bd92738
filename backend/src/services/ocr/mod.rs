//! Image analysis collaborators used by the upload handler.
//!
//! - `client`: calls the external OCR service and returns the recognized text.
//! - `color`: samples a strip photo and suggests chemical indicator values.

pub mod client;
pub mod color;

pub use client::OcrClient;
