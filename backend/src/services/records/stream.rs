use actix_web::http::header;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use common::model::record::RecordView;
use futures_util::stream;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;

use crate::error::ApiError;
use crate::feed::{ChangeFeed, Subscription};
use crate::services::blocking;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    limit: Option<usize>,
}

fn sse_event(event: &str, data: &str) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

async fn snapshot(store: &Store, limit: Option<usize>) -> Result<Bytes, ApiError> {
    let records = blocking(store, move |s| s.list_records(limit)).await?;
    let views: Vec<RecordView> = records.iter().map(RecordView::from).collect();
    Ok(sse_event("records", &serde_json::to_string(&views)?))
}

/// A failed refresh is reported in-band and the stream stays open.
async fn snapshot_or_error(store: &Store, limit: Option<usize>) -> Bytes {
    match snapshot(store, limit).await {
        Ok(event) => event,
        Err(e) => {
            warn!("Record stream refresh failed: {}", e);
            sse_event("error", &json!({ "error": e.to_string() }).to_string())
        }
    }
}

struct StreamState {
    store: Store,
    subscription: Subscription,
    limit: Option<usize>,
    pending: Option<Bytes>,
}

/// Handler for `GET /api/records/stream`.
pub async fn process(
    params: web::Query<StreamParams>,
    store: web::Data<Store>,
    feed: web::Data<ChangeFeed>,
) -> Result<HttpResponse, ApiError> {
    let limit = params.limit;
    let subscription = feed.subscribe();
    debug!("Record stream opened, {} subscriber(s)", feed.subscriber_count());
    let first = snapshot(&store, limit).await?;

    let state = StreamState {
        store: store.get_ref().clone(),
        subscription,
        limit,
        pending: Some(first),
    };
    let events = stream::unfold(state, |mut state| async move {
        if let Some(event) = state.pending.take() {
            return Some((Ok::<_, Infallible>(event), state));
        }
        let Some(change) = state.subscription.recv().await else {
            state.subscription.unsubscribe();
            return None;
        };
        debug!("Record {} {:?}, refreshing stream", change.record_id, change.kind);
        let event = snapshot_or_error(&state.store, state.limit).await;
        Some((Ok(event), state))
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events))
}
