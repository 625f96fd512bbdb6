//! HTTP server implementation using Axum.
//!
//! Every `/api` route sits behind a guard middleware that sweeps stale jobs,
//! enforces the origin allow-list and per-client rate limits, and checks the
//! shared-secret header in live mode. CORS headers (and preflight answers)
//! come from tower-http with the same explicit origin list.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::artifacts;
use crate::config::Mode;
use crate::job::JobView;
use crate::runner;
use crate::state::AppState;
use crate::tools::build_stdin;

pub const API_KEY_HEADER: &str = "x-toolrunner-key";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not found")
}

pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    Router::new()
        .route("/api/run/:tool", post(run_tool))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/artifacts/:artifact_id", get(download_artifact))
        .route("/api/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), guard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .with_state(state)
}

pub async fn run_server(state: AppState) {
    let addr = SocketAddr::from((state.config.host, state.config.port));
    info!("toolrunner [{}] listening on {}", state.config.mode, addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Request gate: lazy retention sweep, origin allow-list, per-client rate
/// limit, and the shared-secret check in live mode.
async fn guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // Finished jobs past retention are reaped on ordinary traffic; their
    // sandbox directories go with them.
    for id in state.store.sweep(state.config.job_retention) {
        let dir = state.config.artifact_root.join(&id);
        tokio::spawn(async move {
            let _ = tokio::fs::remove_dir_all(dir).await;
        });
    }

    if let Some(origin) = req.headers().get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|o| state.config.allowed_origins.iter().any(|a| a == o))
            .unwrap_or(false);
        if !allowed {
            return api_error(StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }

    let client = client_ip(&req);
    if !state.limiter.check(&client, req.method()) {
        return api_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    if state.config.mode == Mode::Live && req.uri().path() != "/api/health" {
        let presented = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim();
        if state.config.api_key.is_empty() || presented != state.config.api_key {
            return api_error(StatusCode::FORBIDDEN, "missing or invalid api key")
                .into_response();
        }
    }

    next.run(req).await
}

fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "ok": true,
        "time": Utc::now(),
        "mode": state.config.mode.as_str(),
    }))
}

#[derive(Serialize)]
struct RunAccepted {
    job_id: String,
    status: &'static str,
    mode: &'static str,
}

async fn run_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    if state.store.active_jobs() >= state.config.max_running_jobs {
        return Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "too many jobs running, please retry shortly",
        ));
    }
    if !state.tools.contains_key(&tool) {
        return Err(api_error(StatusCode::BAD_REQUEST, "unsupported tool"));
    }
    let Json(payload) =
        payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    // Full stdin construction doubles as payload validation; the runner
    // rebuilds it before spawning.
    build_stdin(&tool, &payload).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let job_id = state.store.create(&tool);
    info!(job_id = %job_id, tool = %tool, "job accepted");
    tokio::spawn(runner::run_job(state.clone(), job_id.clone(), payload));

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            job_id,
            status: "queued",
            mode: state.config.mode.as_str(),
        }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    state.store.view(&id).map(Json).ok_or_else(not_found)
}

async fn download_artifact(
    State(state): State<AppState>,
    Path((job_id, artifact_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (path, name, tool) = state
        .store
        .artifact(&job_id, &artifact_id)
        .ok_or_else(not_found)?;

    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }
    // The stored path is re-validated at serve time, not trusted from
    // creation time.
    let sandbox = state.config.artifact_root.join(&job_id);
    let tool_root = state.tools.get(&tool).map(|def| def.root.clone());
    if !artifacts::allowed_for_job(&sandbox, tool_root.as_deref(), &path) {
        return Err(api_error(StatusCode::FORBIDDEN, "artifact path denied"));
    }

    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;
    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .body(body)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
