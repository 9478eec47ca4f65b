//! Local HTTP API for the MCP binary and other automation clients.
//! Workflow discovery, execution, status and cancellation, plus direct tool
//! calls and tool connections.

pub mod ws;

use crate::error::{OfficeflowError, StepError};
use crate::state::AppState;
use crate::tools::{ToolActionResult, ToolConnection, ToolSummary};
use crate::workflow::{Execution, WorkflowDefinition, WorkflowSummary};
use axum::{
    extract::{Path as AxumPath, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub type ApiState = Arc<AppState>;

type ApiError = (StatusCode, Json<Value>);

/// API key authentication middleware.
/// Skips authentication for GET /api/health so the MCP binary can probe the server.
async fn api_key_auth(
    State(expected_key): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Request logging middleware: method, path, status and duration.
async fn request_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if path == "/api/health" {
        return next.run(request).await;
    }

    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::warn!("{} {} -> {} ({} ms)", method, path, status.as_u16(), duration_ms);
    } else {
        tracing::debug!("{} {} -> {} ({} ms)", method, path, status.as_u16(), duration_ms);
    }
    response
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Workflows
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/:id", get(get_workflow))
        .route("/api/workflows/:id/execute", post(execute_workflow))
        // Executions
        .route("/api/executions", get(list_executions))
        .route("/api/executions/:id", get(get_execution))
        .route("/api/executions/:id/cancel", post(cancel_execution))
        // Tool integrations
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:id/actions/:action", post(invoke_tool))
        .route("/api/tools/:id/connect", post(connect_tool))
        .route("/api/tools/:id/disconnect", post(disconnect_tool))
        .route("/api/connections", get(list_connections))
        // WebSocket (real-time events)
        .route("/api/ws", get(ws::ws_handler))
        // Utility
        .route("/api/health", get(health))
        .with_state(state)
}

/// Full application: router plus auth, logging, concurrency limit and CORS.
/// Used by run_server and by integration tests to exercise API key middleware.
pub fn app(state: ApiState, api_key: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    let router = match api_key {
        Some(key) => base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth)),
        None => base_router,
    };
    router
        .layer(middleware::from_fn(request_log_middleware))
        .layer(ConcurrencyLimitLayer::new(32))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderName::from_static("x-api-key"),
                ]),
        )
}

pub async fn run_server(state: ApiState, port: u16, api_key: Option<String>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| format!("Failed to bind API port {}: {}", port, e))?;
    let app = app(state, api_key);
    tracing::info!("Officeflow API listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Map an engine error to a status code and JSON body.
///
/// Failed executions carry their id and final snapshot so partial results
/// can be inspected by the caller.
fn api_error(state: &AppState, err: OfficeflowError) -> ApiError {
    let message = err.to_string();
    match err {
        OfficeflowError::WorkflowNotFound(_)
        | OfficeflowError::ExecutionNotFound(_)
        | OfficeflowError::ToolNotFound(_)
        | OfficeflowError::ActionNotFound { .. } => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
        }
        OfficeflowError::ToolCallFailed(_) => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": message })))
        }
        OfficeflowError::Validation(_) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
        }
        OfficeflowError::ExecutionFailed {
            execution_id,
            source,
        } => {
            let status = match source {
                StepError::Cancelled { .. } => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let execution = state.engine.get_workflow_status(&execution_id).ok();
            (
                status,
                Json(json!({
                    "error": message,
                    "execution_id": execution_id,
                    "execution": execution,
                })),
            )
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        ),
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

async fn list_workflows(State(state): State<ApiState>) -> Json<Vec<WorkflowSummary>> {
    Json(state.engine.list_workflows())
}

async fn get_workflow(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    state
        .engine
        .get_workflow(&id)
        .map(Json)
        .map_err(|e| api_error(&state, e))
}

#[derive(Debug, Deserialize, Default)]
struct ExecuteQuery {
    /// Return 202 with the execution id instead of waiting for the run.
    #[serde(default)]
    background: bool,
}

async fn execute_workflow(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<ExecuteQuery>,
    body: Option<Json<HashMap<String, Value>>>,
) -> Result<Response, ApiError> {
    let parameters = body.map(|Json(p)| p).unwrap_or_default();

    if query.background {
        let execution_id = state
            .engine
            .start_workflow(&id, parameters)
            .map_err(|e| api_error(&state, e))?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "execution_id": execution_id })),
        )
            .into_response());
    }

    let execution = state
        .engine
        .execute_workflow(&id, parameters)
        .await
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(execution).into_response())
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct ExecutionsQuery {
    #[serde(default)]
    active: bool,
}

async fn list_executions(
    State(state): State<ApiState>,
    Query(query): Query<ExecutionsQuery>,
) -> Json<Vec<Execution>> {
    if query.active {
        Json(state.engine.list_active_workflows())
    } else {
        Json(state.engine.list_executions())
    }
}

async fn get_execution(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Execution>, ApiError> {
    state
        .engine
        .get_workflow_status(&id)
        .map(Json)
        .map_err(|e| api_error(&state, e))
}

async fn cancel_execution(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> Json<Value> {
    let cancelled = state.engine.cancel_workflow(&id);
    Json(json!({ "cancelled": cancelled }))
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct ToolsQuery {
    category: Option<String>,
}

async fn list_tools(
    State(state): State<ApiState>,
    Query(query): Query<ToolsQuery>,
) -> Json<Vec<ToolSummary>> {
    match query.category {
        Some(category) => Json(state.engine.list_tools_by_category(&category)),
        None => Json(state.engine.list_tools()),
    }
}

async fn invoke_tool(
    State(state): State<ApiState>,
    AxumPath((id, action)): AxumPath<(String, String)>,
    body: Option<Json<HashMap<String, Value>>>,
) -> Result<Json<ToolActionResult>, ApiError> {
    let parameters = body.map(|Json(p)| p).unwrap_or_default();
    state
        .engine
        .invoke_tool(&id, &action, parameters)
        .await
        .map(Json)
        .map_err(|e| api_error(&state, e))
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    token: String,
}

async fn connect_tool(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ToolConnection>, ApiError> {
    state
        .engine
        .connect_tool(&id, &req.token)
        .map(Json)
        .map_err(|e| api_error(&state, e))
}

async fn disconnect_tool(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> Json<Value> {
    let disconnected = state.engine.disconnect_tool(&id);
    Json(json!({ "disconnected": disconnected }))
}

async fn list_connections(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.engine.connected_tools())
}
