use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Json, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::LifeHub;
use crate::config::Config;
use crate::domains::history::HistoryEvent;
use crate::domains::records::DailySummary;
use crate::domains::user::UserContext;
use crate::error::{LifehubError, Result};
use crate::services::history::{HistoryQuery, MAX_DAY_EVENTS};
use crate::services::live::LiveFeed;
use crate::services::quick_log::RegexClassifier;
use crate::services::summary::SummaryOutcome;

const AI_UNREACHABLE: &str = "Error connecting to AI";

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<LifeHub>,
    pub token: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct HistoryParams {
    user_id: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    today: bool,
}

#[derive(Serialize)]
struct HistoryResponse {
    events: Vec<HistoryEvent>,
}

#[derive(Deserialize)]
struct UserParams {
    user_id: Option<String>,
}

#[derive(Serialize)]
struct SummaryResponse {
    status: &'static str,
    summary: Option<DailySummary>,
}

#[derive(Deserialize)]
struct QuickLogRequest {
    user_id: Option<String>,
    text: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", any(chat_proxy))
        .route("/history", get(history))
        .route("/history_stream", get(history_stream))
        .route("/summary", get(latest_summary).post(generate_summary))
        .route("/quick_log", post(quick_log))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn error_body(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn error_response(err: LifehubError) -> Response {
    let status = match &err {
        LifehubError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        LifehubError::NotFound(_) => StatusCode::NOT_FOUND,
        LifehubError::Conflict(_) => StatusCode::CONFLICT,
        LifehubError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LifehubError::Storage(_) | LifehubError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifehubError::Upstream { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        LifehubError::Http(_) => StatusCode::BAD_GATEWAY,
        LifehubError::Serialization(_) | LifehubError::Runtime(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    error_body(status, err.to_string())
}

/// Forwards a chat-completions body to the configured model and relays the
/// upstream status and body untouched. Gated like every data route, since each
/// call spends the configured API key.
async fn chat_proxy(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        _ => return error_body(StatusCode::BAD_REQUEST, "Body must be a JSON object"),
    };
    let Some(openai) = state.hub.openai() else {
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "Missing OpenAI API key");
    };

    match openai.forward(payload).await {
        Ok((status, bytes)) => Response::builder()
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY))
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| error_body(StatusCode::BAD_GATEWAY, AI_UNREACHABLE)),
        Err(err) => {
            warn!(error = %err, "chat proxy could not reach upstream");
            error_body(StatusCode::BAD_GATEWAY, AI_UNREACHABLE)
        }
    }
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let ctx = UserContext::from_optional(params.user_id);
    let history = state.hub.history();
    let result = if params.today {
        history.today(&ctx).await.map(|mut events| {
            events.truncate(params.limit.unwrap_or(MAX_DAY_EVENTS));
            events
        })
    } else {
        history
            .recent(
                &ctx,
                HistoryQuery {
                    limit: params.limit,
                    since: None,
                },
            )
            .await
    };

    match result {
        Ok(events) => (StatusCode::OK, Json(HistoryResponse { events })).into_response(),
        Err(err) => error_response(err),
    }
}

/// Server-sent events: the full window on connect, then the full window again
/// after every change. The feed is released when the client goes away.
async fn history_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let ctx = UserContext::from_optional(params.user_id);
    let feed = match LiveFeed::mount(
        Arc::clone(state.hub.history()),
        ctx,
        HistoryQuery {
            limit: params.limit,
            since: None,
        },
    )
    .await
    {
        Ok(feed) => feed,
        Err(err) => return error_response(err),
    };

    let body = Body::from_stream(async_stream::stream! {
        let feed = feed;
        let mut updates = feed.watch();
        let initial = updates.borrow_and_update().clone();
        yield Ok::<Bytes, std::convert::Infallible>(sse_line(&initial));
        while updates.changed().await.is_ok() {
            let events = updates.borrow_and_update().clone();
            yield Ok(sse_line(&events));
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(body)
        .unwrap_or_else(|_| error_body(StatusCode::INTERNAL_SERVER_ERROR, "stream setup failed"))
}

fn sse_line(events: &[HistoryEvent]) -> Bytes {
    let payload = serde_json::to_string(events).unwrap_or_else(|_| "[]".to_string());
    Bytes::from(format!("data: {payload}\n\n"))
}

async fn latest_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UserParams>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let ctx = UserContext::from_optional(params.user_id);
    let summary = match state.hub.summary() {
        Ok(service) => service.latest_for_today(&ctx).await,
        Err(err) => Err(err),
    };
    match summary {
        Ok(summary) => (
            StatusCode::OK,
            Json(SummaryResponse {
                status: if summary.is_some() { "found" } else { "missing" },
                summary,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn generate_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<UserParams>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let ctx = UserContext::from_optional(params.user_id);
    let outcome = match state.hub.summary() {
        Ok(service) => service.generate_daily(&ctx).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(SummaryOutcome::NothingToSummarize) => (
            StatusCode::OK,
            Json(SummaryResponse {
                status: "nothing_to_summarize",
                summary: None,
            }),
        )
            .into_response(),
        Ok(SummaryOutcome::Generated(summary)) => (
            StatusCode::CREATED,
            Json(SummaryResponse {
                status: "generated",
                summary: Some(summary),
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn quick_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QuickLogRequest>,
) -> impl IntoResponse {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }

    let ctx = UserContext::from_optional(payload.user_id);
    match state
        .hub
        .tracker()
        .quick_log(&ctx, &payload.text, &RegexClassifier)
        .await
    {
        Ok(event) => (StatusCode::CREATED, Json(json!({ "event": event }))).into_response(),
        Err(err) => error_response(err),
    }
}

fn authorize(
    headers: &HeaderMap,
    token: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("");

    if token.is_empty() || bearer == token || api_key == token {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ))
    }
}

pub async fn run(host: &str, port: u16, config: Config, token: &str) -> Result<()> {
    run_with_shutdown(host, port, config, token, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(
    host: &str,
    port: u16,
    config: Config,
    token: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = LifeHub::from_config(config).await?;
    if hub.openai().is_none() {
        warn!("no OpenAI credentials configured; chat and summaries are disabled");
    }
    let state = AppState {
        hub: Arc::new(hub),
        token: token.to_string(),
    };
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LifehubError::Runtime(e.to_string()))?;
    info!(%addr, "lifehubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| LifehubError::Runtime(e.to_string()))?;

    Ok(())
}
