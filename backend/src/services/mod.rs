//! # HTTP Services
//!
//! Every group of endpoints lives in its own sub-module and exposes a
//! `configure_routes()` returning an Actix `Scope`. `configure` registers them all,
//! the more specific prefixes first so that `/api` does not swallow them.
//!
//! ## Sub-modules:
//! - `api`: the action-dispatch endpoint at `/api` (records, audit log, users, analytics).
//! - `images`: `POST /api/images/{slot}` photo upload with OCR and color analysis.
//! - `records`: `GET /api/records/stream`, the Server-Sent Events change feed.
//! - `analytics`: aggregate pass/fail and duration statistics over records.
//! - `ocr`: OCR client and the color classifier.
//! - `cors`: permissive CORS headers and preflight responses.

pub mod analytics;
pub mod api;
pub mod cors;
pub mod images;
pub mod ocr;
pub mod records;

use actix_web::web;
use log::warn;

use crate::error::ApiError;
use crate::storage::BlobStore;
use crate::store::Store;

/// Registers every scope of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(images::configure_routes())
        .service(records::configure_routes())
        .service(api::configure_routes());
}

/// JSON body limits and error mapping; malformed bodies become 400 `{ "error" }`.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| ApiError::Validation(format!("invalid JSON body: {}", err)).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(format!("invalid query: {}", err)).into())
}

/// Runs a store operation on the blocking thread pool.
pub(crate) async fn blocking<F, T>(store: &Store, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    web::block(move || op(&store)).await?
}

/// Removes photos no record uses any more. A failure only logs a warning.
pub(crate) async fn release_blobs(blobs: web::Data<dyn BlobStore>, paths: Vec<String>) {
    if paths.is_empty() {
        return;
    }
    let blobs = blobs.into_inner();
    let outcome = web::block(move || {
        for path in &paths {
            if let Err(e) = blobs.delete(path) {
                warn!("Could not remove blob {}: {}", path, e);
            }
        }
    })
    .await;
    if let Err(e) = outcome {
        warn!("Blob cleanup did not run: {}", e);
    }
}
