use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use common::model::record::{record_date, RecordView};
use serde::Deserialize;
use serde_json::json;

use super::{require, unknown_action};
use crate::error::ApiError;
use crate::services::{analytics, blocking};
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    action: Option<String>,
    id: Option<String>,
    limit: Option<usize>,
    entity_id: Option<String>,
    email: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

fn date_param(raw: Option<&str>, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(|value| {
        record_date::parse(value).ok_or_else(|| {
            ApiError::Validation(format!("parameter '{}' is not a date: '{}'", name, value))
        })
    })
    .transpose()
}

/// Handler for `GET /api?action=...`.
pub async fn process(
    params: web::Query<QueryParams>,
    store: web::Data<Store>,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let action = require(params.action.as_deref(), "action")?;

    match action {
        "getRecords" => {
            let limit = params.limit;
            let records = blocking(&store, move |s| s.list_records(limit)).await?;
            let views: Vec<RecordView> = records.iter().map(RecordView::from).collect();
            Ok(HttpResponse::Ok().json(views))
        }
        "getRecord" => {
            let id = require(params.id, "id")?;
            let lookup = id.clone();
            let record = blocking(&store, move |s| s.get_record(&lookup))
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("record '{}' not found", id)))?;
            Ok(HttpResponse::Ok().json(RecordView::from(&record)))
        }
        "getAuditLogs" => {
            let (limit, entity_id) = (params.limit, params.entity_id);
            let entries =
                blocking(&store, move |s| s.list_audit(limit, entity_id.as_deref())).await?;
            Ok(HttpResponse::Ok().json(entries))
        }
        "getUserRole" => {
            let email = require(params.email, "email")?;
            let lookup = email.clone();
            let user = blocking(&store, move |s| s.get_user_by_email(&lookup))
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("user '{}' not found", email)))?;
            Ok(HttpResponse::Ok().json(json!({ "email": user.email, "role": user.role })))
        }
        "getUsers" => {
            let users = blocking(&store, |s| s.list_users()).await?;
            Ok(HttpResponse::Ok().json(users))
        }
        "getAnalytics" => {
            let from = date_param(params.from.as_deref(), "from")?;
            let to = date_param(params.to.as_deref(), "to")?;
            let records = blocking(&store, move |s| s.list_records_between(from, to)).await?;
            Ok(HttpResponse::Ok().json(analytics::summarize(&records)))
        }
        other => Err(unknown_action(other)),
    }
}
