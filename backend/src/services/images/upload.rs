use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use common::extract::{extract_attest_reading, extract_slip_fields, AttestReading, ExtractedFields};
use common::model::record::{ImageOcrMeta, ImageRef, IndicatorResult};
use common::requests::ChemicalValues;
use futures_util::StreamExt;
use log::{info, warn};
use md5::Context;
use serde::Serialize;
use serde_json::from_slice;

use super::ImageSlot;
use crate::error::ApiError;
use crate::services::ocr::color::{self, ColorBuckets};
use crate::services::ocr::OcrClient;
use crate::storage::BlobStore;

/// Answer of an upload: the stored image plus everything read from it.
#[derive(Debug, Serialize)]
pub struct ImageAnalysis {
    pub image: ImageRef,
    pub ocr_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ExtractedFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<AttestReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<ColorBuckets>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<ChemicalValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio_test: Option<IndicatorResult>,
}

struct UploadedFile {
    bytes: Vec<u8>,
    md5: String,
}

/// Reads the `file` and `json` parts of the form.
async fn read_form(mut payload: Multipart) -> Result<(UploadedFile, ChemicalValues), ApiError> {
    let mut file: Option<UploadedFile> = None;
    let mut current = ChemicalValues::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ApiError::Validation(format!("invalid multipart body: {}", e)))?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        match name.as_deref() {
            Some("file") => {
                let mut md5_hasher = Context::new();
                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| ApiError::Validation(format!("upload interrupted: {}", e)))?;
                    md5_hasher.consume(&chunk);
                    bytes.extend_from_slice(&chunk);
                }
                file = Some(UploadedFile {
                    bytes,
                    md5: format!("{:x}", md5_hasher.finalize()),
                });
            }
            Some("json") => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| ApiError::Validation(format!("upload interrupted: {}", e)))?;
                    bytes.extend_from_slice(&chunk);
                }
                current = from_slice(&bytes)
                    .map_err(|e| ApiError::Validation(format!("invalid 'json' part: {}", e)))?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::Validation("missing 'file' part".into()))?;
    if file.bytes.is_empty() {
        return Err(ApiError::Validation("uploaded file is empty".into()));
    }
    Ok((file, current))
}

/// Blob extension from the decoded format, so the stored name never trusts the client.
fn image_extension(bytes: &[u8]) -> Result<&'static str, ApiError> {
    let format = image::guess_format(bytes)
        .map_err(|_| ApiError::Validation("uploaded file is not a recognized image".into()))?;
    format
        .extensions_str()
        .first()
        .copied()
        .ok_or_else(|| ApiError::Validation("uploaded file is not a recognized image".into()))
}

fn non_empty(meta: ImageOcrMeta) -> Option<ImageOcrMeta> {
    (meta != ImageOcrMeta::default()).then_some(meta)
}

/// Handler for `POST /api/images/{slot}`.
pub async fn process(
    slot: web::Path<String>,
    payload: Multipart,
    blobs: web::Data<dyn BlobStore>,
    ocr: web::Data<OcrClient>,
) -> Result<HttpResponse, ApiError> {
    let slot: ImageSlot = slot.parse().map_err(ApiError::Validation)?;
    let (file, current) = read_form(payload).await?;
    let extension = image_extension(&file.bytes)?;
    let path = format!("{}/{}.{}", slot, file.md5, extension);

    let ocr_text = ocr.recognize(&file.bytes).await?;
    let text = ocr_text.as_deref().unwrap_or_default();

    let bytes = web::Bytes::from(file.bytes);
    let mut analysis = ImageAnalysis {
        image: ImageRef {
            path: path.clone(),
            url: String::new(),
            ocr: None,
        },
        ocr_text: None,
        fields: None,
        reading: None,
        colors: None,
        suggestion: None,
        bio_test: None,
    };
    match slot {
        ImageSlot::Slip => {
            let fields = extract_slip_fields(text);
            let sample = bytes.clone();
            let colors = web::block(move || color::analyze_image(&sample)).await?;
            analysis.image.ocr = non_empty(fields.ocr_meta());
            analysis.suggestion = Some(color::suggest_chemical_indicators(&colors, current));
            analysis.colors = Some(colors);
            analysis.fields = Some(fields);
        }
        ImageSlot::Attest => {
            let reading = extract_attest_reading(text);
            analysis.image.ocr = non_empty(reading.ocr_meta());
            analysis.bio_test = reading.result;
            analysis.reading = Some(reading);
        }
    }

    let store = blobs.into_inner();
    let blob_path = path.clone();
    analysis.image.url = web::block(move || store.put(&blob_path, &bytes)).await??;
    analysis.ocr_text = ocr_text;

    info!(
        "Stored {} image {} ({} OCR)",
        slot,
        path,
        if analysis.ocr_text.is_some() { "with" } else { "without" }
    );
    if analysis.ocr_text.is_none() && ocr.is_configured() {
        warn!("OCR returned no text for {}", path);
    }
    Ok(HttpResponse::Ok().json(analysis))
}

#[cfg(test)]
mod tests {
    use actix_web::dev::ServerHandle;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse, HttpServer};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use std::time::Duration;

    use crate::services::ocr::OcrClient;
    use crate::services::test_support::TestState;

    const BOUNDARY: &str = "steritrack-boundary";

    fn strip_png(color: [u8; 3]) -> Vec<u8> {
        let strip = RgbImage::from_pixel(8, 8, Rgb(color));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(strip)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        png
    }

    fn multipart_body(file: &[u8], current: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(json) = current {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"json\"\r\n\
                     Content-Type: application/json\r\n\r\n{}\r\n",
                    BOUNDARY, json
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"slip.png\"\r\n\
                 Content-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    /// Local OCR service answering every request with `status` and `text`.
    fn ocr_service(status: StatusCode, text: &'static str) -> (OcrClient, ServerHandle) {
        let server = HttpServer::new(move || {
            App::new().default_service(web::to(move || async move {
                HttpResponse::build(status).json(json!({ "text": text }))
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let endpoint = format!("http://{}/ocr", server.addrs()[0]);
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        let client = OcrClient::new(Some(endpoint), Duration::from_secs(5)).unwrap();
        (client, handle)
    }

    #[actix_web::test]
    async fn test_slip_text_flows_into_fields_and_ocr_meta() {
        let (ocr, server) = ocr_service(StatusCode::OK, "Cycle nr: 0412\nTOTAL TIME: 45 MIN");
        let state = TestState::new().with_ocr(ocr);
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;

        let body = multipart_body(&strip_png([250, 250, 250]), None);
        let resp = test::call_service(&app, upload("/api/images/slip", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let analysis: Value = test::read_body_json(resp).await;
        assert_eq!(analysis["ocr_text"], json!("Cycle nr: 0412\nTOTAL TIME: 45 MIN"));
        assert_eq!(analysis["fields"]["cycle_identifier"], json!("0412"));
        assert_eq!(analysis["fields"]["total_duration"], json!("45"));
        assert_eq!(analysis["image"]["ocr"]["duration"], json!("45"));
        assert_eq!(analysis["image"]["ocr"]["duration_seconds"], json!(2700));
        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_attest_text_sets_bio_test() {
        let (ocr, server) = ocr_service(StatusCode::OK, "S/N: ab-4471\n14:05\nRESULT - POSITIVE");
        let state = TestState::new().with_ocr(ocr);
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;

        let body = multipart_body(&strip_png([250, 250, 250]), None);
        let resp = test::call_service(&app, upload("/api/images/attest", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let analysis: Value = test::read_body_json(resp).await;
        assert_eq!(analysis["bio_test"], json!("fail"));
        assert_eq!(analysis["reading"]["serial_number"], json!("AB-4471"));
        assert_eq!(analysis["image"]["ocr"]["reader_time"], json!("14:05"));
        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_failing_ocr_service_is_bad_gateway() {
        let (ocr, server) = ocr_service(StatusCode::INTERNAL_SERVER_ERROR, "");
        let state = TestState::new().with_ocr(ocr);
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;

        let body = multipart_body(&strip_png([250, 250, 250]), None);
        let resp = test::call_service(&app, upload("/api/images/slip", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("OCR"));
        assert!(std::fs::read_dir(state.blobs.root()).unwrap().next().is_none());
        server.stop(true).await;
    }

    #[actix_web::test]
    async fn test_slip_upload_stores_blob_and_suggests_from_color() {
        let state = TestState::new();
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;

        let body = multipart_body(
            &strip_png([40, 200, 60]),
            Some(r#"{"chemical_external":"pass","chemical_internal":""}"#),
        );
        let resp = test::call_service(&app, upload("/api/images/slip", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let analysis: Value = test::read_body_json(resp).await;

        let path = analysis["image"]["path"].as_str().unwrap();
        assert!(path.starts_with("slip/") && path.ends_with(".png"));
        assert!(state.blobs.root().join(path).exists());
        assert_eq!(
            analysis["image"]["url"],
            json!(format!("http://localhost:8080/files/{}", path))
        );
        assert_eq!(analysis["ocr_text"], json!(null));
        assert_eq!(analysis["colors"]["green_or_yellow"], json!(true));
        assert_eq!(analysis["suggestion"]["chemical_external"], json!("fail"));
        assert_eq!(analysis["suggestion"]["chemical_internal"], json!("fail"));
    }

    #[actix_web::test]
    async fn test_attest_upload_has_reading_and_no_colors() {
        let state = TestState::new();
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;
        let body = multipart_body(&strip_png([250, 250, 250]), None);
        let resp = test::call_service(&app, upload("/api/images/attest", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let analysis: Value = test::read_body_json(resp).await;
        assert!(analysis.get("colors").is_none());
        assert!(analysis["reading"].is_object());
    }

    #[actix_web::test]
    async fn test_rejects_unknown_slot_and_non_images() {
        let state = TestState::new();
        let app = test::init_service(App::new().configure(|cfg| state.register(cfg))).await;

        let body = multipart_body(&strip_png([0, 0, 0]), None);
        let resp = test::call_service(&app, upload("/api/images/selfie", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = multipart_body(b"plain text, not a photo", None);
        let resp = test::call_service(&app, upload("/api/images/slip", body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
