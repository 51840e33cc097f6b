//! Queue API handlers
//!
//! Every mutation answers with the refreshed queue snapshot so the UI can redraw
//! from one response.

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::manager::{QueueEntry, QueueManager, QueueSnapshot};
use crate::queue::{Direction, QueueError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Item {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Queue(QueueError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Queue request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiRes<T> = Result<T, ApiError>;

type Manager = State<Arc<QueueManager>>;

#[derive(Debug, Deserialize)]
pub struct EnqueueForm {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemForm {
    #[serde(default)]
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveForm {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub direction: String,
}

async fn snapshot(manager: &QueueManager) -> ApiRes<Json<QueueSnapshot>> {
    Ok(Json(manager.list_all().await?))
}

pub async fn list_queue(State(manager): Manager) -> ApiRes<Json<QueueSnapshot>> {
    snapshot(&manager).await
}

/// Handler for getting a single item by ID
pub async fn get_item(
    State(manager): Manager,
    Path(id): Path<String>,
) -> ApiRes<Json<QueueEntry>> {
    match manager.find(&id).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::NotFound(id)),
    }
}

pub async fn enqueue(
    State(manager): Manager,
    Form(form): Form<EnqueueForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    manager.enqueue(&form.url).await?;
    snapshot(&manager).await
}

pub async fn remove(
    State(manager): Manager,
    Form(form): Form<ItemForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    manager.remove(&form.item_id).await?;
    snapshot(&manager).await
}

pub async fn move_item(
    State(manager): Manager,
    Form(form): Form<MoveForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    let direction = form
        .direction
        .parse::<Direction>()
        .map_err(QueueError::Validation)?;
    manager.move_item(&form.item_id, direction).await?;
    snapshot(&manager).await
}

pub async fn retry(
    State(manager): Manager,
    Form(form): Form<ItemForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    manager.retry(&form.item_id).await?;
    snapshot(&manager).await
}

pub async fn cancel(
    State(manager): Manager,
    Form(form): Form<ItemForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    manager.cancel(&form.item_id).await?;
    snapshot(&manager).await
}

pub async fn mark_downloaded(
    State(manager): Manager,
    Form(form): Form<ItemForm>,
) -> ApiRes<Json<QueueSnapshot>> {
    manager.mark_downloaded(&form.item_id).await?;
    snapshot(&manager).await
}

pub async fn clear_failed(State(manager): Manager) -> ApiRes<Json<QueueSnapshot>> {
    manager.clear_failed().await?;
    snapshot(&manager).await
}

pub async fn clear_completed(State(manager): Manager) -> ApiRes<Json<QueueSnapshot>> {
    manager.clear_completed().await?;
    snapshot(&manager).await
}

pub fn queue_api() -> Router<Arc<QueueManager>> {
    Router::new()
        .route("/api/queue", get(list_queue).post(enqueue))
        .route("/api/queue/item/{id}", get(get_item))
        .route("/api/queue/remove", post(remove))
        .route("/api/queue/move", post(move_item))
        .route("/api/queue/retry", post(retry))
        .route("/api/queue/cancel", post(cancel))
        .route("/api/queue/downloaded", post(mark_downloaded))
        .route("/api/queue/clear_failed", post(clear_failed))
        .route("/api/queue/clear_completed", post(clear_completed))
}
