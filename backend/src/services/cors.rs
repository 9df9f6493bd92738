//! Permissive CORS: every response allows any origin and `OPTIONS` on any route
//! answers a preflight.

use actix_web::http::header;
use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::{HttpRequest, HttpResponse};

use crate::error::ApiError;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, X-User-Id, X-User-Email, X-User-Role";

/// Middleware adding `Access-Control-Allow-Origin: *` to every response.
pub fn default_headers() -> DefaultHeaders {
    DefaultHeaders::new().add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
}

pub async fn preflight() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS))
        .insert_header((header::ACCESS_CONTROL_MAX_AGE, "86400"))
        .finish()
}

/// Fallback for unmatched routes: preflight for `OPTIONS`, 404 otherwise.
pub async fn fallback(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    if req.method() == Method::OPTIONS {
        Ok(preflight().await)
    } else {
        Err(ApiError::NotFound(format!("no route for {} {}", req.method(), req.path())))
    }
}
