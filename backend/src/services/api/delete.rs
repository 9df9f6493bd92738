use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{require, unknown_action, RequestActor};
use crate::error::ApiError;
use crate::feed::{ChangeFeed, ChangeKind};
use crate::services::{blocking, release_blobs};
use crate::storage::BlobStore;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    action: Option<String>,
    id: Option<String>,
}

/// Handler for `DELETE /api?action=deleteRecord&id=...`.
///
/// The record and its audit entry are written first. Attached photos that no other
/// record uses are removed afterwards.
pub async fn process(
    params: web::Query<DeleteParams>,
    store: web::Data<Store>,
    feed: web::Data<ChangeFeed>,
    blobs: web::Data<dyn BlobStore>,
    actor: RequestActor,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let RequestActor(actor) = actor;
    let action = require(params.action.as_deref(), "action")?;
    if action != "deleteRecord" {
        return Err(unknown_action(action));
    }
    let id = require(params.id, "id")?;

    let removed = blocking(&store, move |s| s.delete_record(&id, &actor)).await?;
    feed.publish(ChangeKind::Deleted, removed.record.id.clone());
    release_blobs(blobs, removed.released_images).await;

    Ok(HttpResponse::Ok().json(json!({ "deleted": removed.record.id })))
}
