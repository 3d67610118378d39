use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{OpenApi, ToSchema};

use agent_console_error::{ConsoleError, ErrorType, ProblemDetails};
use agent_console_provider::ProviderApi;
use agent_console_registry::snapshot::build_snapshot;
use agent_console_registry::types::{LogicalAgent, RegistryScope, RuntimeRecord};

use crate::orchestrator::{DeletionOutcome, DeletionReport, Orchestrator, Phase};

pub struct AppState {
    auth: AuthConfig,
    orchestrator: Mutex<Orchestrator>,
}

impl AppState {
    pub fn new(auth: AuthConfig, provider: Arc<dyn ProviderApi>, scope: RegistryScope) -> Self {
        Self {
            auth,
            orchestrator: Mutex::new(Orchestrator::new(provider, scope)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: String) -> Self {
        Self { token: Some(token) }
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_state(Arc::new(state)).0
}

pub fn build_router_with_state(shared: Arc<AppState>) -> (Router, Arc<AppState>) {
    let mut v1_router = Router::new()
        .route("/health", get(get_health))
        .route("/runtimes", get(get_runtimes))
        .route("/runtimes/refresh", post(refresh_runtimes))
        .route("/selection", get(get_selection))
        .route("/selection/toggle", post(toggle_selection))
        .route("/selection/all", post(select_all))
        .route("/selection/clear", post(clear_selection))
        .route("/selection/delete", post(delete_selection))
        .with_state(shared.clone());

    if shared.auth.token.is_some() {
        v1_router = v1_router.layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_token,
        ));
    }

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %req.method(),
                uri = %req.uri()
            )
        })
        .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
            tracing::info!(
                parent: span,
                status = %res.status(),
                latency_ms = latency.as_millis()
            );
        });

    let router = Router::new()
        .nest("/v1", v1_router)
        .fallback(not_found)
        .layer(trace_layer);

    (router, shared)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_health,
        get_runtimes,
        refresh_runtimes,
        get_selection,
        toggle_selection,
        select_all,
        clear_selection,
        delete_selection
    ),
    components(
        schemas(
            HealthResponse,
            RegistryResponse,
            RuntimeView,
            RuntimeRecord,
            LogicalAgent,
            SelectionResponse,
            ToggleRequest,
            Phase,
            DeletionOutcome,
            DeletionReport,
            ProblemDetails,
            ErrorType
        )
    ),
    tags(
        (name = "meta", description = "Service metadata"),
        (name = "runtimes", description = "Unified agent runtime registry"),
        (name = "selection", description = "Multi-select and bulk deletion")
    )
)]
pub struct ApiDoc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Console(#[from] ConsoleError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Console(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(problem)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
}

/// A runtime plus the logical agents correlated with it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeView {
    #[serde(flatten)]
    pub runtime: RuntimeRecord,
    pub agents: Vec<LogicalAgent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryResponse {
    pub runtimes: Vec<RuntimeView>,
    /// False when agent discovery was incomplete; usage data may then
    /// undercount and the view must say so instead of claiming completeness.
    pub usage_data_complete: bool,
    /// Unix milliseconds.
    pub fetched_at: i64,
    pub phase: Phase,
    pub selection: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    pub selection: Vec<String>,
    pub phase: Phase,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub identity: String,
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if path == "/v1/health" || path == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = match &state.auth.token {
        Some(token) => token.as_str(),
        None => return Ok(next.run(req).await),
    };

    let provided = extract_token(req.headers());
    if provided.as_deref() == Some(expected) {
        Ok(next.run(req).await)
    } else {
        Err(ConsoleError::TokenInvalid.into())
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?;
    let value = value.to_str().ok()?.trim();
    let (scheme, rest) = value.split_once(' ')?;
    match scheme.to_ascii_lowercase().as_str() {
        "bearer" | "token" => Some(rest.trim().to_string()),
        _ => None,
    }
}

async fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "404 Not Found".to_string())
}

#[utoipa::path(
    get,
    path = "/v1/health",
    responses((status = 200, body = HealthResponse)),
    tag = "meta"
)]
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Run one fetch cycle without holding the orchestrator lock across the
/// provider calls, so a newer refresh can overtake a slow one and the slow
/// result is discarded as stale.
async fn refresh_registry(state: &Arc<AppState>) -> Result<(), ApiError> {
    let (token, provider, scope) = {
        let mut orchestrator = state.orchestrator.lock().await;
        (
            orchestrator.begin_refresh(),
            orchestrator.provider(),
            orchestrator.scope().clone(),
        )
    };
    let result = build_snapshot(provider.as_ref(), &scope).await;
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.complete_refresh(token, result)?;
    Ok(())
}

pub(crate) fn registry_response(
    orchestrator: &Orchestrator,
) -> Result<RegistryResponse, ConsoleError> {
    let snapshot = orchestrator
        .snapshot()
        .ok_or(ConsoleError::ProviderUnavailable {
            message: "registry not loaded".to_string(),
        })?;
    let runtimes = snapshot
        .runtimes
        .iter()
        .map(|runtime| RuntimeView {
            runtime: runtime.clone(),
            agents: snapshot.correlation.agents_for(&runtime.identity).to_vec(),
        })
        .collect();
    Ok(RegistryResponse {
        runtimes,
        usage_data_complete: snapshot.usage_data_complete,
        fetched_at: snapshot.fetched_at,
        phase: orchestrator.phase(),
        selection: orchestrator.selection(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/runtimes",
    responses(
        (status = 200, body = RegistryResponse),
        (status = 502, body = ProblemDetails)
    ),
    tag = "runtimes"
)]
async fn get_runtimes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegistryResponse>, ApiError> {
    let loaded = state.orchestrator.lock().await.snapshot().is_some();
    if !loaded {
        refresh_registry(&state).await?;
    }
    let orchestrator = state.orchestrator.lock().await;
    Ok(Json(registry_response(&orchestrator)?))
}

#[utoipa::path(
    post,
    path = "/v1/runtimes/refresh",
    responses(
        (status = 200, body = RegistryResponse),
        (status = 502, body = ProblemDetails)
    ),
    tag = "runtimes"
)]
async fn refresh_runtimes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegistryResponse>, ApiError> {
    refresh_registry(&state).await?;
    let orchestrator = state.orchestrator.lock().await;
    Ok(Json(registry_response(&orchestrator)?))
}

#[utoipa::path(
    get,
    path = "/v1/selection",
    responses((status = 200, body = SelectionResponse)),
    tag = "selection"
)]
async fn get_selection(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    let orchestrator = state.orchestrator.lock().await;
    Json(SelectionResponse {
        selection: orchestrator.selection(),
        phase: orchestrator.phase(),
    })
}

#[utoipa::path(
    post,
    path = "/v1/selection/toggle",
    request_body = ToggleRequest,
    responses(
        (status = 200, body = SelectionResponse),
        (status = 404, body = ProblemDetails)
    ),
    tag = "selection"
)]
async fn toggle_selection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.toggle(&request.identity)?;
    Ok(Json(SelectionResponse {
        selection: orchestrator.selection(),
        phase: orchestrator.phase(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/selection/all",
    responses((status = 200, body = SelectionResponse)),
    tag = "selection"
)]
async fn select_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.select_all()?;
    Ok(Json(SelectionResponse {
        selection: orchestrator.selection(),
        phase: orchestrator.phase(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/selection/clear",
    responses((status = 200, body = SelectionResponse)),
    tag = "selection"
)]
async fn clear_selection(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.clear_selection();
    Json(SelectionResponse {
        selection: orchestrator.selection(),
        phase: orchestrator.phase(),
    })
}

#[utoipa::path(
    post,
    path = "/v1/selection/delete",
    responses(
        (status = 200, body = DeletionReport),
        (status = 400, body = ProblemDetails),
        (status = 409, body = ProblemDetails)
    ),
    tag = "selection"
)]
async fn delete_selection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeletionReport>, ApiError> {
    let mut orchestrator = state.orchestrator.lock().await;
    let report = orchestrator.delete_selected().await?;
    Ok(Json(report))
}
