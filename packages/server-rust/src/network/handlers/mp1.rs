//! MP1 service-management handlers.
//!
//! Each request becomes an [`Operation`] and runs through the operation
//! stack. Pipeline outcomes (including MP1 errors) arrive as replies;
//! middleware failures are rendered here.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower::ServiceExt;
use tracing::warn;

use super::AppState;
use crate::mp1::{MepReply, MepRequest};
use crate::service::operation::{service_names, Operation, OperationContext, OperationError};

/// Route serving both discover (GET) and register (POST).
pub const SERVICES_PATH: &str = "/mep/mec_service_mgmt/v1/applications/{appInstanceId}/services";

const JSON: &str = "application/json";

/// `GET .../applications/{appInstanceId}/services`
pub async fn discover_handler(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = MepRequest {
        method,
        resource: uri.path().to_string(),
        headers,
        app_instance_id,
        project: None,
        query: query.into(),
        body: Bytes::new(),
    };
    run(&state, |ctx| Operation::Discover { ctx, request }).await
}

/// `POST .../applications/{appInstanceId}/services`
pub async fn register_handler(
    State(state): State<AppState>,
    Path(app_instance_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MepRequest {
        method,
        resource: uri.path().to_string(),
        headers,
        app_instance_id,
        project: None,
        query: Default::default(),
        body,
    };
    run(&state, |ctx| Operation::Register { ctx, request }).await
}

async fn run(state: &AppState, build: impl FnOnce(OperationContext) -> Operation) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();
    let call_id = state.call_ids.fetch_add(1, Ordering::Relaxed);
    let op = build(OperationContext::new(
        call_id,
        service_names::MP1,
        state.operation_timeout_ms,
    ));

    match state.operations.clone().oneshot(op).await {
        Ok(rsp) => reply_response(rsp.reply),
        Err(e) => error_response(&e),
    }
}

fn reply_response(reply: MepReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, JSON)], reply.body).into_response()
}

fn error_response(err: &OperationError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!(status = status.as_u16(), error = %err, "operation failed");
    let body = json!({
        "title": status.canonical_reason().unwrap_or("Error"),
        "status": status.as_u16(),
        "detail": err.to_string(),
    });
    (status, axum::Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
