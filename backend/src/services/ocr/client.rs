//! HTTP client for the external OCR service.
//!
//! The service takes `{ "image": "<base64>" }` and answers `{ "text": "..." }`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ApiError;

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

#[derive(Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl OcrClient {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("could not build OCR client: {}", e)))?;
        match &endpoint {
            Some(url) => info!("OCR endpoint: {}", url),
            None => warn!("No OCR endpoint configured, image analysis will skip text recognition"),
        }
        Ok(OcrClient { http, endpoint })
    }

    /// A client that never calls out.
    #[cfg(test)]
    pub fn disabled() -> Self {
        OcrClient {
            http: reqwest::Client::new(),
            endpoint: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Recognized text of `image`, or `None` when no endpoint is configured.
    pub async fn recognize(&self, image: &[u8]) -> Result<Option<String>, ApiError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(None);
        };
        let encoded = STANDARD.encode(image);
        let response = self
            .http
            .post(endpoint)
            .json(&OcrRequest { image: &encoded })
            .send()
            .await
            .map_err(|e| ApiError::External(format!("OCR request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ApiError::External(format!("OCR service error: {}", e)))?;
        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| ApiError::External(format!("OCR response unreadable: {}", e)))?;
        info!("OCR returned {} characters", body.text.chars().count());
        Ok(Some(body.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_unconfigured_client_returns_none() {
        let client = OcrClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        assert_eq!(client.recognize(b"bytes").await.unwrap(), None);
    }

    #[actix_web::test]
    async fn test_unreachable_endpoint_is_an_external_error() {
        let client = OcrClient::new(
            Some("http://127.0.0.1:9/ocr".to_string()),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.recognize(b"bytes").await.unwrap_err();
        assert!(matches!(err, ApiError::External(_)));
    }
}
