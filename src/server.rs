//! HTTP trigger endpoint.
//!
//! | Route | Method | Description |
//! |-------|--------|-------------|
//! | `/webhooks/trigger` | POST | Dispatch `{ webhookId, message }` once |
//! | `/health` | GET | Liveness probe |
//!
//! Every handled dispatch outcome answers `200` with a JSON body whose
//! `success` flag tells the caller whether the endpoint accepted the
//! delivery. Unknown and ineligible configurations carry `skipped: true`.
//! A body that is not `{ webhookId, message }` answers `400`; storage or
//! runtime faults answer `500`.

use crate::webhooks::{WebhookDispatcher, WebhookMessage};
use crate::{Error, Result};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted trigger body (1 MiB).
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

type AppState = Arc<WebhookDispatcher>;

/// Trigger request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TriggerRequest {
    webhook_id: String,
    message: Value,
}

/// Builds the router over a shared dispatcher.
pub fn router(dispatcher: Arc<WebhookDispatcher>) -> Router {
    Router::new()
        .route("/webhooks/trigger", post(trigger))
        .route("/health", get(health))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Serves the router on `0.0.0.0:port` until the process exits.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created or the port cannot be
/// bound.
pub fn run(dispatcher: Arc<WebhookDispatcher>, port: u16) -> Result<()> {
    let app = router(dispatcher);

    let rt = tokio::runtime::Runtime::new().map_err(|e| Error::OperationFailed {
        operation: "create_runtime".to_string(),
        cause: e.to_string(),
    })?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port, "Starting webhook trigger server");

    rt.block_on(async {
        let listener =
            tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| Error::OperationFailed {
                    operation: "bind".to_string(),
                    cause: e.to_string(),
                })?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "serve".to_string(),
                cause: e.to_string(),
            })
    })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn trigger(State(dispatcher): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    if body.len() > MAX_REQUEST_BODY_SIZE {
        tracing::warn!(
            body_size = body.len(),
            max_size = MAX_REQUEST_BODY_SIZE,
            "Trigger body exceeds maximum size"
        );
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "success": false, "error": "request body too large" })),
        );
    }

    let request: TriggerRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": format!("invalid request body: {e}") })),
            );
        },
    };

    let webhook_id = request.webhook_id;
    let message = WebhookMessage::new(request.message);

    let outcome = {
        let webhook_id = webhook_id.clone();
        tokio::task::spawn_blocking(move || dispatcher.trigger_webhook(&webhook_id, &message))
            .await
    };

    match outcome {
        Ok(result) => respond(&webhook_id, result),
        Err(e) => {
            tracing::error!(webhook_id = %webhook_id, error = %e, "Dispatch task failed");
            internal_error()
        },
    }
}

fn respond(
    webhook_id: &str,
    result: Result<crate::webhooks::DeliveryResult>,
) -> (StatusCode, Json<Value>) {
    match result {
        Ok(delivery) => match serde_json::to_value(&delivery) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                tracing::error!(webhook_id, error = %e, "Failed to encode delivery result");
                internal_error()
            },
        },
        Err(Error::NotFound(id)) => (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "skipped": true,
                "error": format!("webhook configuration not found: {id}"),
            })),
        ),
        Err(Error::NotEligible { reason, .. }) => (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "skipped": true,
                "error": reason.to_string(),
            })),
        ),
        Err(e) => {
            tracing::error!(webhook_id, error = %e, "Webhook trigger failed");
            internal_error()
        },
    }
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "internal error" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::{
        DeliveryFailure, MemoryWebhookStore, MockDeliveryBackend, WebhookConfigStore,
        validate_webhook_config,
    };
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn setup(delivery: MockDeliveryBackend) -> (Router, Arc<MemoryWebhookStore>, String) {
        let store = Arc::new(MemoryWebhookStore::new());
        let created = store
            .create(
                validate_webhook_config(&json!({
                    "workspaceId": "ws_1",
                    "name": "crm",
                    "url": "https://crm.example.com/hook",
                    "events": ["call.scheduled"]
                }))
                .expect("valid"),
            )
            .expect("create");
        let dispatcher = WebhookDispatcher::new(store.clone(), Arc::new(delivery));
        (router(Arc::new(dispatcher)), store, created.id)
    }

    async fn post_trigger(app: Router, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    fn trigger_body(webhook_id: &str, event: &str) -> String {
        json!({ "webhookId": webhook_id, "message": { "event": event, "callId": "c-1" } })
            .to_string()
    }

    #[tokio::test]
    async fn test_successful_trigger() {
        let (app, store, id) = setup(MockDeliveryBackend::new());

        let (status, body) = post_trigger(app, trigger_body(&id, "call.scheduled")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["statusCode"], 200);
        assert!(store.get(&id).expect("get").expect("present").last_triggered.is_some());
    }

    #[tokio::test]
    async fn test_failed_delivery_is_still_ok() {
        let (app, store, id) = setup(MockDeliveryBackend::always(Err(DeliveryFailure::Timeout)));

        let (status, body) = post_trigger(app, trigger_body(&id, "call.scheduled")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "TimeoutError");
        assert_eq!(store.get(&id).expect("get").expect("present").failure_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_and_ineligible_are_skipped() {
        let (app, _store, id) = setup(MockDeliveryBackend::new());

        let missing = trigger_body("wh_missing", "call.scheduled");
        let (status, body) = post_trigger(app.clone(), missing).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skipped"], true);

        let (status, body) = post_trigger(app, trigger_body(&id, "call.completed")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["skipped"], true);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (app, _store, _id) = setup(MockDeliveryBackend::new());

        let (status, body) = post_trigger(app.clone(), "not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = post_trigger(app, json!({ "message": {} }).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _store, _id) = setup(MockDeliveryBackend::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).map(|v| v.as_bytes()),
            Some(&b"nosniff"[..])
        );
    }
}
