//! JSON HTTP façade over a [`Queue`].
//!
//! All routes live at `/` and are distinguished by method:
//!
//! | Method | Operation | Request body |
//! |--------|-----------|--------------|
//! | `GET` | receive | none; `204` when empty |
//! | `POST` | send | `{"message":{"body":"<base64>","delay_ms":0}}` |
//! | `PUT` | extend | `{"message":{"id":"...","delay_ms":5000}}` |
//! | `DELETE` | delete | `{"message":{"id":"..."}}` |
//!
//! Errors are returned as `{"error": code, "message": text}`.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::error::Error;
use crate::message::{Message, MessageId};
use crate::queue::Queue;
use crate::store::MessageStore;

/// Build a router serving `queue`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new().nest("/queues/emails", leaseq::http::router(queue));
/// axum::serve(listener, app).await?;
/// ```
pub fn router<S>(queue: Queue<S>) -> Router
where
    S: MessageStore,
{
    Router::new()
        .route(
            "/",
            get(receive::<S>)
                .post(send::<S>)
                .put(extend::<S>)
                .delete(delete::<S>),
        )
        .with_state(queue)
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    message: MessageFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageFields {
    id: String,
    body: String,
    delay_ms: i64,
}

#[derive(Debug, Serialize)]
struct MessageView {
    id: MessageId,
    body: String,
    received_count: u32,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            body: STANDARD.encode(&message.body),
            received_count: message.received_count,
        }
    }
}

async fn receive<S>(State(queue): State<Queue<S>>) -> Response
where
    S: MessageStore,
{
    match queue.receive().await {
        Ok(Some(message)) => {
            Json(json!({ "message": MessageView::from(message) })).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error("error receiving message", e),
    }
}

async fn send<S>(
    State(queue): State<Queue<S>>,
    request: Result<Json<MessageRequest>, JsonRejection>,
) -> Response
where
    S: MessageStore,
{
    let fields = match request {
        Ok(Json(request)) => request.message,
        Err(rejection) => return bad_request(rejection),
    };

    if fields.delay_ms < 0 {
        return json_error(
            StatusCode::BAD_REQUEST,
            "invalid_delay",
            "delay cannot be negative",
        );
    }

    let body = match STANDARD.decode(&fields.body) {
        Ok(body) => body,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                format!("body must be base64: {e}"),
            );
        }
    };

    match queue.send(body, millis(fields.delay_ms)).await {
        Ok(id) => Json(json!({ "message": { "id": id } })).into_response(),
        Err(e) => store_error("error sending message", e),
    }
}

async fn extend<S>(
    State(queue): State<Queue<S>>,
    request: Result<Json<MessageRequest>, JsonRejection>,
) -> Response
where
    S: MessageStore,
{
    let fields = match request {
        Ok(Json(request)) => request.message,
        Err(rejection) => return bad_request(rejection),
    };

    if fields.id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "invalid_id", "id cannot be empty");
    }
    if fields.delay_ms <= 0 {
        return json_error(
            StatusCode::BAD_REQUEST,
            "invalid_delay",
            "delay must be larger than zero",
        );
    }

    let id = MessageId::new(fields.id);
    match queue.extend(&id, millis(fields.delay_ms)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ Error::MessageNotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", e.to_string())
        }
        Err(e) => store_error("error extending message", e),
    }
}

async fn delete<S>(
    State(queue): State<Queue<S>>,
    request: Result<Json<MessageRequest>, JsonRejection>,
) -> Response
where
    S: MessageStore,
{
    let fields = match request {
        Ok(Json(request)) => request.message,
        Err(rejection) => return bad_request(rejection),
    };

    if fields.id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "invalid_id", "id cannot be empty");
    }

    match queue.delete(&MessageId::new(fields.id)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_error("error deleting message", e),
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or_default())
}

fn bad_request(rejection: JsonRejection) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_request",
        format!("error decoding request: {}", rejection.body_text()),
    )
}

fn store_error(context: &'static str, e: Error) -> Response {
    error!(error = %e, "{context}");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_error",
        format!("{context}: {e}"),
    )
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
