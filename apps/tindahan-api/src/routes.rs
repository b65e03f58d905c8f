//! # HTTP Routes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET  /health                          storage health (no auth)         │
//! │                                                                         │
//! │  /v1 (bearer token required)                                            │
//! │  POST /sync/push                       batch replay                     │
//! │  GET  /sync/pull?cursor=               change feed                      │
//! │  POST /sales/complete                  complete_sale                    │
//! │  POST /sales/park                      park_sale                        │
//! │  POST /sales/{id}/void                 void_sale                        │
//! │  POST /sales/{id}/refund               refund_sale                      │
//! │  POST /stock/adjust                    adjust_stock                     │
//! │  POST /stock/restock                   restock                          │
//! │  POST /customers/{id}/payments         record_payment                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Direct operations take their idempotency key from the `Idempotency-Key`
//! header, falling back to the key carried in the payload.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use tindahan_core::{clock, Actor, ClientEvent, OperationKind};
use tindahan_db::Storage;
use tindahan_sync::{Engine, EngineError, PullResponse, PushRequest, PushResponse};

use crate::auth::{extract_bearer_token, JwtManager};
use crate::error::ApiError;

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub const REPLAYED: &str = "idempotent-replayed";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(engine: Engine, jwt: JwtManager) -> Self {
        AppState {
            engine: Arc::new(engine),
            jwt: Arc::new(jwt),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync/push", post(push))
        .route("/sync/pull", get(pull))
        .route("/sales/complete", post(complete_sale))
        .route("/sales/park", post(park_sale))
        .route("/sales/{id}/void", post(void_sale))
        .route("/sales/{id}/refund", post(refund_sale))
        .route("/stock/adjust", post(adjust_stock))
        .route("/stock/restock", post(restock))
        .route("/customers/{id}/payments", post(record_payment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let actor = state.jwt.validate_access_token(token)?.into_actor();
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Serialize)]
struct Success<T> {
    ok: bool,
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success { ok: true, data })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Health & Sync
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    server_time: String,
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .store()
        .health_check()
        .await
        .map_err(EngineError::from)?;
    Ok(success(HealthStatus {
        status: "ok",
        server_time: clock::now().to_rfc3339(),
    }))
}

async fn push(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let request = body(payload)?;
    let response = state.engine.push(&actor, request.events).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct PullQuery {
    cursor: Option<String>,
}

async fn pull(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<PullQuery>,
) -> Result<Json<PullResponse>, ApiError> {
    let response = state.engine.pull(&actor, query.cursor.as_deref()).await?;
    Ok(Json(response))
}

// =============================================================================
// Direct Operations
// =============================================================================

async fn run(
    state: &AppState,
    actor: &Actor,
    headers: &HeaderMap,
    kind: OperationKind,
    payload: Value,
) -> Result<Response, ApiError> {
    let event = ClientEvent::parse(kind.as_str(), payload).map_err(EngineError::from)?;
    let key = idempotency_key(headers);

    let outcome = state.engine.execute(actor, &event, key.as_deref()).await?;
    debug!(operation = %kind, replayed = outcome.replayed, "Direct operation served");

    let mut response = success(outcome.data).into_response();
    if outcome.replayed {
        response
            .headers_mut()
            .insert(REPLAYED, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// Sets `field` from the path segment, which wins over the body.
fn with_path_id(mut payload: Value, field: &str, id: String) -> Result<Value, ApiError> {
    match payload.as_object_mut() {
        Some(map) => {
            map.insert(field.to_string(), Value::String(id));
            Ok(payload)
        }
        None => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

async fn complete_sale(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    run(&state, &actor, &headers, OperationKind::CompleteSale, body(payload)?).await
}

async fn park_sale(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    run(&state, &actor, &headers, OperationKind::ParkSale, body(payload)?).await
}

async fn void_sale(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = with_path_id(body(payload)?, "sale_id", id)?;
    run(&state, &actor, &headers, OperationKind::VoidSale, payload).await
}

async fn refund_sale(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = with_path_id(body(payload)?, "sale_id", id)?;
    run(&state, &actor, &headers, OperationKind::RefundSale, payload).await
}

async fn adjust_stock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    run(&state, &actor, &headers, OperationKind::AdjustStock, body(payload)?).await
}

async fn restock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    run(&state, &actor, &headers, OperationKind::Restock, body(payload)?).await
}

async fn record_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = with_path_id(body(payload)?, "customer_id", id)?;
    run(&state, &actor, &headers, OperationKind::RecordPayment, payload).await
}
