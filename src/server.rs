//! HTTP surface of the relay.
//!
//! `/webhook/alarm` is what the Salto platform calls. The `/api/*` routes back
//! the management UI: recipient CRUD, connection status, chat listing and a
//! test broadcast.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::alarm::{format_alarm_now, AlarmPayload};
use crate::delivery::{Delivery, DeliverySummary};
use crate::messaging::{MessagingClient, SendError};
use crate::recipients::{RecipientStore, StoreError};
use crate::session::SessionMonitor;

/// Individuals beyond this are left out of `/api/chats`.
const MAX_LISTED_INDIVIDUALS: usize = 50;

// ── Shared state ───────────────────────────────────────────────────────────────

pub struct AppState {
    pub store: Arc<RecipientStore>,
    pub delivery: Delivery,
    pub session: Arc<SessionMonitor>,
    pub client: Arc<dyn MessagingClient>,
    pub port: u16,
    pub test_message: String,
}

// ── Errors ─────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("WhatsApp not connected")]
    NotReady,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] SendError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Store(StoreError::DuplicateTarget(_)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Target already exists" }),
            ),
            ApiError::Store(StoreError::InvalidTarget(_)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Target must not contain commas or line breaks" }),
            ),
            ApiError::Store(StoreError::TargetNotFound(_)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Target not found" }),
            ),
            ApiError::Store(e @ StoreError::Io { .. }) => {
                error!("Failed to save targets: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to save targets", "details": e.to_string() }),
                )
            }
            ApiError::Client(e) => {
                error!("Messaging client error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ── Request / response types ───────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct AddTargetRequest {
    #[serde(default)]
    target: Option<String>,
}

#[derive(Deserialize, Default)]
struct TestMessageRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct TargetsResponse {
    targets: Vec<String>,
}

#[derive(Serialize)]
struct TargetChangeResponse {
    success: bool,
    message: &'static str,
    targets: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    whatsapp_connected: bool,
    #[serde(rename = "needsQRCode")]
    needs_qr_code: bool,
    configured_targets: usize,
    targets: Vec<String>,
    port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    whatsapp_ready: bool,
}

#[derive(Serialize)]
struct AlarmResponse {
    message: &'static str,
    #[serde(flatten)]
    summary: DeliverySummary,
}

#[derive(Serialize)]
struct GroupEntry {
    name: String,
    id: String,
    participants: usize,
}

#[derive(Serialize)]
struct IndividualEntry {
    name: String,
    id: String,
}

#[derive(Serialize)]
struct ChatsResponse {
    groups: Vec<GroupEntry>,
    individuals: Vec<IndividualEntry>,
}

/// Lenient JSON body: an empty or malformed body becomes the default value.
fn parse_lenient<T: serde::de::DeserializeOwned + Default>(body: &[u8], what: &str) -> T {
    if body.iter().all(u8::is_ascii_whitespace) {
        return T::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        warn!("Ignoring malformed {} body: {}", what, e);
        T::default()
    })
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn alarm_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AlarmResponse>, ApiError> {
    info!("Received alarm webhook: {}", String::from_utf8_lossy(&body));

    if !state.session.is_ready() {
        error!("WhatsApp client not ready");
        return Err(ApiError::NotReady);
    }

    let alarm: AlarmPayload = parse_lenient(&body, "alarm");
    let summary = state.delivery.deliver(&format_alarm_now(&alarm)).await;

    Ok(Json(AlarmResponse {
        message: "Alarm notification sent",
        summary,
    }))
}

async fn test_message(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DeliverySummary>, ApiError> {
    if !state.session.is_ready() {
        return Err(ApiError::NotReady);
    }

    let request: TestMessageRequest = parse_lenient(&body, "test message");
    let text = request
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.test_message.clone());

    Ok(Json(state.delivery.deliver(&text).await))
}

async fn list_targets(State(state): State<Arc<AppState>>) -> Json<TargetsResponse> {
    Json(TargetsResponse {
        targets: state.store.list(),
    })
}

async fn add_target(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TargetChangeResponse>, ApiError> {
    let request: AddTargetRequest = parse_lenient(&body, "add target");
    let target = request
        .target
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Target is required".to_string()))?;

    let targets = state.store.add(&target)?;
    Ok(Json(TargetChangeResponse {
        success: true,
        message: "Target added",
        targets,
    }))
}

// The path extractor has already percent-decoded the segment.
async fn remove_target(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
) -> Result<Json<TargetChangeResponse>, ApiError> {
    let targets = state.store.remove(&target)?;
    Ok(Json(TargetChangeResponse {
        success: true,
        message: "Target removed",
        targets,
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.session.current();
    let targets = state.store.list();
    Json(StatusResponse {
        whatsapp_connected: session.ready,
        needs_qr_code: session.needs_pairing(),
        configured_targets: targets.len(),
        targets,
        port: state.port,
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        whatsapp_ready: state.session.is_ready(),
    })
}

async fn list_chats(State(state): State<Arc<AppState>>) -> Result<Json<ChatsResponse>, ApiError> {
    if !state.session.is_ready() {
        return Err(ApiError::NotReady);
    }

    let chats = state.client.list_chats().await?;
    let (groups, individuals): (Vec<_>, Vec<_>) = chats.into_iter().partition(|c| c.is_group);

    Ok(Json(ChatsResponse {
        groups: groups
            .into_iter()
            .map(|g| GroupEntry {
                name: g.name.unwrap_or_else(|| "Unknown".to_string()),
                id: g.id,
                participants: g.participants.unwrap_or(0),
            })
            .collect(),
        individuals: individuals
            .into_iter()
            .take(MAX_LISTED_INDIVIDUALS)
            .map(|i| IndividualEntry {
                name: i.name.unwrap_or_else(|| "Unknown".to_string()),
                id: i.id,
            })
            .collect(),
    }))
}

// ── Router / entry point ───────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/alarm", post(alarm_webhook))
        .route("/api/test-message", post(test_message))
        .route("/api/targets", get(list_targets).post(add_target))
        .route("/api/targets/{target}", delete(remove_target))
        .route("/api/status", get(status))
        .route("/api/chats", get(list_chats))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let addr = format!("{}:{}", bind, state.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Salto-WhatsApp bridge running on {}", addr);
    info!("Configured targets: {}", state.store.list().len());

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
