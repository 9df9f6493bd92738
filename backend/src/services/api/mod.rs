//! # Action API
//!
//! A single endpoint, `/api`, selects the operation with an `action` discriminator:
//! from the query string for `GET` and `DELETE`, from the JSON body for `POST` and
//! `PUT`. Missing or unknown actions and missing parameters answer 400, unknown
//! entities 404, everything else that fails 500; error bodies are `{ "error": "..." }`.
//!
//! ## Sub-modules:
//! - `query`: `GET` actions `getRecords`, `getRecord`, `getAuditLogs`, `getUserRole`,
//!   `getUsers`, `getAnalytics`.
//! - `mutate`: `POST` actions `createRecord`, `saveUser`, `logAuthEvent` and the `PUT`
//!   action `updateRecord`.
//! - `delete`: the `DELETE` action `deleteRecord`.
//! - `actor`: reads the acting user from the `X-User-*` headers.

mod actor;
mod delete;
mod mutate;
mod query;

use actix_web::web::{delete, get, post, put, route, scope};
use actix_web::Scope;

pub use actor::RequestActor;

use crate::error::ApiError;
use crate::services::cors;

const API_PATH: &str = "/api";

pub fn configure_routes() -> Scope {
    scope(API_PATH).service(
        actix_web::web::resource("")
            .route(get().to(query::process))
            .route(post().to(mutate::process_post))
            .route(put().to(mutate::process_put))
            .route(delete().to(delete::process))
            .route(route().method(actix_web::http::Method::OPTIONS).to(cors::preflight)),
    )
}

pub(crate) fn require<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::Validation(format!("missing parameter '{}'", name)))
}

pub(crate) fn unknown_action(action: &str) -> ApiError {
    ApiError::Validation(format!("unknown action '{}'", action))
}
