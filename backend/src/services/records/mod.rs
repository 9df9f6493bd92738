//! # Record Stream Service
//!
//! `GET /api/records/stream?limit=N` keeps the connection open as a Server-Sent
//! Events stream. The first event is the current list of records (newest first,
//! at most `limit`); a new snapshot follows every change published on the
//! `ChangeFeed`. Closing the connection drops the subscription.

mod stream;

use actix_web::web::{get, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/records";

pub fn configure_routes() -> Scope {
    scope(API_PATH).route("/stream", get().to(stream::process))
}
