/// HTTP surface — the butler's front door.
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::agent::Agent;
use crate::config::Config;
use crate::devices::DeviceRegistry;
use crate::rules::RuleEngine;
use crate::schedule::{ScheduleError, ScheduleStore, TaskStatus};
use crate::scheduler::Notification;
use crate::tools::ToolRegistry;

pub struct AppState {
    pub devices: Arc<DeviceRegistry>,
    pub schedules: Arc<ScheduleStore>,
    pub tools: Arc<ToolRegistry>,
    pub rules: RuleEngine,
    pub agent: Mutex<Agent>,
    pub notifier: broadcast::Sender<Notification>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let devices = Arc::new(DeviceRegistry::with_default_home());
        let schedules = Arc::new(ScheduleStore::new());
        let tools = Arc::new(ToolRegistry::new(devices.clone(), schedules.clone()));
        let rules = RuleEngine::new(devices.clone());
        let agent = Mutex::new(Agent::new(config.clone()));
        let (notifier, _) = broadcast::channel(64);

        Arc::new(Self {
            devices,
            schedules,
            tools,
            rules,
            agent,
            notifier,
            config,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/devices", get(get_devices))
        .route("/chat", post(chat))
        .route("/schedules", get(list_schedules))
        .route("/schedules/{id}", delete(cancel_schedule))
        .route("/notifications", get(notifications))
        .route("/reset", post(reset))
        .with_state(state)
        .layer(cors)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_devices(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.devices.list()))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

/// Rules first, then the agent. A model failure degrades to an apology
/// rather than a 500 — the home keeps responding either way.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty message".to_string()));
    }

    let rule = state.rules.process(&message);
    let response = if rule.matched {
        rule.response
    } else if !state.config.is_configured() {
        "I can handle simple commands like \"turn on the light\", but I need an \
         API key (set OPENAI_API_KEY) for anything more."
            .to_string()
    } else {
        let mut agent = state.agent.lock().await;
        match agent.run_collect(message, &state.tools).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("agent turn failed: {e:#}");
                "Sorry, I ran into a problem while handling that. Please try again."
                    .to_string()
            }
        }
    };

    Ok(Json(json!({
        "response": response,
        "devices": state.devices.list(),
        "schedules": state.schedules.list(None),
    })))
}

#[derive(Debug, Deserialize)]
struct ScheduleQuery {
    status: Option<String>,
}

async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let filter = match query.status.as_deref() {
        Some(s) => Some(
            TaskStatus::parse(s)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown status `{s}`")))?,
        ),
        None => None,
    };
    Ok(Json(json!(state.schedules.list(filter))))
}

/// Cancellation is idempotent from the client's point of view: every
/// outcome is a 200, the `outcome` field says what actually happened.
async fn cancel_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let outcome = match state.schedules.cancel(&id) {
        Ok(_) => "cancelled",
        Err(ScheduleError::AlreadyTerminal(_)) => "already_terminal",
        Err(_) => "not_found",
    };
    Json(json!({"id": id, "outcome": outcome}))
}

/// SSE stream of fired reminders. Lagged subscribers skip, they never
/// block the scheduler loop.
async fn notifications(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(n) => serde_json::to_string(&n)
            .ok()
            .map(|data| Ok(Event::default().event("reminder").data(data))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

/// Put the home back in its seeded state and forget the conversation.
async fn reset(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.devices.reset();
    state.schedules.clear();
    state.agent.lock().await.clear_history();
    Json(json!({"status": "ok"}))
}
