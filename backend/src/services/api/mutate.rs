use actix_web::{web, HttpResponse};
use common::model::record::{RecordInput, RecordView};
use common::model::user::UserInput;
use common::requests::ActionRequest;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{require, unknown_action, RequestActor};
use crate::error::ApiError;
use crate::feed::{ChangeFeed, ChangeKind};
use crate::services::{blocking, release_blobs};
use crate::storage::BlobStore;
use crate::store::Store;

fn parse_data<T: DeserializeOwned>(data: Option<Value>) -> Result<T, ApiError> {
    let data = require(data, "data")?;
    serde_json::from_value(data)
        .map_err(|e| ApiError::Validation(format!("invalid 'data': {}", e)))
}

/// Re-derives the URL of every attached photo from its blob path, so a stored
/// reference always points into this service's blob store.
fn parse_record(data: Option<Value>, blobs: &dyn BlobStore) -> Result<RecordInput, ApiError> {
    let mut input: RecordInput = parse_data(data)?;
    for image in input.slip_image.iter_mut().chain(input.attest_image.iter_mut()) {
        image.url = blobs.url(&image.path)?;
    }
    Ok(input)
}

/// Handler for `POST /api`.
pub async fn process_post(
    body: web::Json<ActionRequest>,
    store: web::Data<Store>,
    feed: web::Data<ChangeFeed>,
    blobs: web::Data<dyn BlobStore>,
    actor: RequestActor,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let RequestActor(actor) = actor;
    let action = require(request.action.as_deref(), "action")?;

    match action {
        "createRecord" => {
            let input = parse_record(request.data, &**blobs)?;
            let record = blocking(&store, move |s| s.create_record(input, &actor)).await?;
            feed.publish(ChangeKind::Created, record.id.clone());
            Ok(HttpResponse::Created().json(RecordView::from(&record)))
        }
        "saveUser" => {
            let input: UserInput = parse_data(request.data)?;
            let user = blocking(&store, move |s| s.upsert_user(input)).await?;
            Ok(HttpResponse::Ok().json(user))
        }
        "logAuthEvent" => {
            let event = require(request.event, "event")?;
            let email = require(request.email, "email")?;
            let entry =
                blocking(&store, move |s| s.log_session_event(event, &email, &actor)).await?;
            Ok(HttpResponse::Ok().json(entry))
        }
        other => Err(unknown_action(other)),
    }
}

/// Handler for `PUT /api`.
pub async fn process_put(
    body: web::Json<ActionRequest>,
    store: web::Data<Store>,
    feed: web::Data<ChangeFeed>,
    blobs: web::Data<dyn BlobStore>,
    actor: RequestActor,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let RequestActor(actor) = actor;
    let action = require(request.action.as_deref(), "action")?;

    match action {
        "updateRecord" => {
            let id = require(request.id, "id")?;
            let input = parse_record(request.data, &**blobs)?;
            let written = blocking(&store, move |s| s.update_record(&id, input, &actor)).await?;
            feed.publish(ChangeKind::Updated, written.record.id.clone());
            release_blobs(blobs, written.released_images).await;
            Ok(HttpResponse::Ok().json(RecordView::from(&written.record)))
        }
        other => Err(unknown_action(other)),
    }
}
