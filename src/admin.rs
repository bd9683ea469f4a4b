//! Administrative HTTP/JSON command interface (§6 collaborator contract).
//!
//! Thin adapter over the lifecycle engine and stores: `submit_fill`,
//! `submit_cancel`, `submit_reject`, `list_orders`, `get_order`,
//! `list_symbols`, `reload_symbols`. Authenticated the same way the matching
//! engine's REST surface is, via [`crate::auth`].

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::auth::{require_admin_or_operator, require_api_key_or_anonymous, AuthConfig, AuthUser};
use crate::lifecycle::{CancelOrigin, LifecycleEngine};
use crate::store::{CsvSymbolSource, SymbolRegistry, SymbolSource};

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleEngine>,
    pub symbols: SymbolRegistry,
    pub router: Arc<crate::router::ExecutionRouter>,
    pub audit: Arc<dyn AuditSink>,
}

/// Builds the admin router with state. Returns `Router<()>` so the caller can
/// call `.into_make_service()` directly with `axum::serve`. `/health` is
/// exempt from auth so deployment probes don't need a key.
pub fn create_router(state: AppState, auth: AuthConfig) -> Router<()> {
    let mutating = Router::new()
        .route("/orders/:id/fill", post(submit_fill))
        .route("/orders/:id/cancel", post(submit_cancel))
        .route("/orders/:id/reject", post(submit_reject))
        .route("/symbols/reload", post(reload_symbols))
        .layer(middleware::from_fn(move |req, next: Next| {
            let auth = auth.clone();
            async move { require_api_key_or_anonymous(req, next, auth).await }
        }));

    Router::new()
        .route("/health", get(health))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/symbols", get(list_symbols))
        .merge(mutating)
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn error_response(status: StatusCode, err: &crate::error::BrokerError) -> Response {
    (status, Json(serde_json::json!({ "error": err.wire_text() }))).into_response()
}

async fn list_orders(Extension(state): Extension<AppState>) -> Response {
    match state.lifecycle.list_orders().await {
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn get_order(Extension(state): Extension<AppState>, Path(id): Path<i64>) -> Response {
    match state.lifecycle.get_order(id).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "order not found").into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

#[derive(serde::Deserialize, Default)]
struct FillRequest {
    quantity: Option<i64>,
}

async fn submit_fill(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    body: Option<Json<FillRequest>>,
) -> Response {
    if let Err(resp) = require_admin_or_operator(&user) {
        return resp;
    }
    let quantity = body.map(|Json(b)| b.quantity).unwrap_or(None);
    match state.lifecycle.fill(id, quantity).await {
        Ok(transitions) => {
            state.router.route_all(&transitions).await;
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_fill",
                Some(serde_json::json!({ "order_internal_id": id })),
                "success",
            ));
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Err(e) => {
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_fill",
                Some(serde_json::json!({ "order_internal_id": id })),
                "error",
            ));
            error_response(StatusCode::BAD_REQUEST, &e)
        }
    }
}

async fn submit_cancel(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Response {
    if let Err(resp) = require_admin_or_operator(&user) {
        return resp;
    }
    match state.lifecycle.cancel(id, CancelOrigin::Admin).await {
        Ok(transition) => {
            state.router.route(&transition).await;
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_cancel",
                Some(serde_json::json!({ "order_internal_id": id })),
                "success",
            ));
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Err(e) => {
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_cancel",
                Some(serde_json::json!({ "order_internal_id": id })),
                "error",
            ));
            error_response(StatusCode::BAD_REQUEST, &e)
        }
    }
}

#[derive(serde::Deserialize)]
struct RejectRequest {
    reason: String,
}

async fn submit_reject(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<RejectRequest>,
) -> Response {
    if let Err(resp) = require_admin_or_operator(&user) {
        return resp;
    }
    match state.lifecycle.reject(id, &body.reason).await {
        Ok(transition) => {
            state.router.route(&transition).await;
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_reject",
                Some(serde_json::json!({ "order_internal_id": id, "reason": body.reason })),
                "success",
            ));
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Err(e) => {
            state.audit.emit(&AuditEvent::now(
                "admin",
                "order_reject",
                Some(serde_json::json!({ "order_internal_id": id })),
                "error",
            ));
            error_response(StatusCode::BAD_REQUEST, &e)
        }
    }
}

async fn list_symbols(Extension(state): Extension<AppState>) -> Response {
    match state.symbols.list().await {
        Ok(symbols) => (StatusCode::OK, Json(symbols)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ReloadSymbolsRequest {
    /// Explicit `(symbol, last_price)` pairs, e.g. from a test or a caller
    /// that already parsed its own source.
    Entries { entries: Vec<(String, Decimal)> },
    /// Path to a CSV file on disk in the `symbol,last_price` format read by
    /// [`CsvSymbolSource`].
    CsvPath { csv_path: String },
}

async fn reload_symbols(
    Extension(state): Extension<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ReloadSymbolsRequest>,
) -> Response {
    if let Err(resp) = require_admin_or_operator(&user) {
        return resp;
    }
    let loaded = match body {
        ReloadSymbolsRequest::Entries { entries } => Ok(entries),
        ReloadSymbolsRequest::CsvPath { csv_path } => CsvSymbolSource::new(csv_path).load(),
    };
    let entries = match loaded {
        Ok(entries) => entries,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    match state.symbols.reload(entries).await {
        Ok(count) => {
            state.audit.emit(&AuditEvent::now(
                "admin",
                "symbol_reload",
                Some(serde_json::json!({ "count": count })),
                "success",
            ));
            (StatusCode::OK, Json(serde_json::json!({ "count": count }))).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}
