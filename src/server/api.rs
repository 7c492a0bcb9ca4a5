//! REST endpoints for starting Runs and polling their status

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::registry::RunRegistry;
use crate::runner::{Observers, RunController, RunMode, RunRequest, RunStatus, StepOutcome};
use crate::store::{LogRow, LogStore, LogWriter};

/// Shared state for API handlers
pub struct AppState {
    pub registry: RunRegistry,
    pub controller: RunController,
    pub store: Option<LogStore>,
    writer: Option<LogWriter>,
    /// Observers attached to every Run besides its registry entry
    observers: Observers,
}

impl AppState {
    /// Recovers the identifier counter from `store` and starts its writer task
    pub async fn new(
        controller: RunController,
        store: Option<LogStore>,
        observers: Observers,
    ) -> Result<Self> {
        let last = match store {
            Some(ref store) => store.max_session_number().await?.unwrap_or(0),
            None => 0,
        };
        info!("Session counter starts after {}", last);
        let writer = store.clone().map(|s| LogWriter::spawn(s).0);

        Ok(Self {
            registry: RunRegistry::new(last),
            controller,
            store,
            writer,
            observers,
        })
    }
}

/// Body of `POST /start_test`
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub url: String,
    #[serde(default, alias = "mode")]
    pub modo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: &'static str,
    pub session_id: String,
}

/// One step as reported by `GET /status/<id>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub step: String,
    pub status: String,
    pub response_time: Option<f64>,
    pub message: Option<String>,
    pub error_message: Option<String>,
}

impl From<&StepOutcome> for ResultRow {
    fn from(outcome: &StepOutcome) -> Self {
        Self {
            step: outcome.step.label().to_string(),
            status: outcome.status.as_str().to_string(),
            response_time: outcome.response_time,
            message: outcome.message.clone(),
            error_message: outcome.error_message.clone(),
        }
    }
}

impl From<LogRow> for ResultRow {
    fn from(row: LogRow) -> Self {
        Self {
            step: row.step,
            status: row.status,
            response_time: row.response_time,
            message: row.message,
            error_message: row.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub progress: u8,
    pub results: Vec<ResultRow>,
}

/// Build API router
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start_test", post(start_test))
        .route("/status/:session_id", get(get_status))
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// POST /start_test - Launch a Run in the background
async fn start_test(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing url");
    }
    let mode = match request.modo.as_deref() {
        Some(label) => match label.parse::<RunMode>() {
            Ok(mode) => mode,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        None => RunMode::default(),
    };

    let (session_id, entry) = state.registry.allocate();
    let mut observers = state.observers.clone().with(entry);
    if let Some(ref writer) = state.writer {
        observers = observers.with(Arc::new(writer.sink(session_id.clone())));
    }

    let run = RunRequest::new(session_id.clone(), url, mode);
    let state = state.clone();
    tokio::spawn(async move {
        let result = state.controller.execute(&run, Arc::new(observers)).await;
        info!("Session {} ended with {:?}", result.id, result.status);
        let persisted = match state.writer {
            Some(ref writer) => writer.flush().await,
            None => false,
        };
        state.registry.finish(&result.id, persisted);
    });

    Json(StartResponse {
        status: "Test initiated",
        session_id,
    })
    .into_response()
}

/// GET /status/:session_id - Live progress, or the persisted log of an older session
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(entry) = state.registry.get(&session_id) {
        let snap = entry.snapshot();
        let status = match snap.status {
            RunStatus::Running => "running",
            _ => "completed",
        };
        return Json(StatusResponse {
            status,
            progress: snap.progress,
            results: snap.results.iter().map(ResultRow::from).collect(),
        })
        .into_response();
    }

    if let Some(ref store) = state.store {
        match store.session_rows(&session_id).await {
            Ok(rows) if !rows.is_empty() => {
                return Json(StatusResponse {
                    status: "completed",
                    progress: 100,
                    results: rows.into_iter().map(ResultRow::from).collect(),
                })
                .into_response();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Status lookup for {} failed: {:#}", session_id, e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    }

    error_response(StatusCode::NOT_FOUND, "Session not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockFactory;
    use crate::driver::SessionOptions;
    use crate::runner::{StepKind, StepStatus};
    use crate::store::LogEntry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn controller(factory: MockFactory) -> RunController {
        let flow = crate::runner::FlowConfig {
            timings: crate::runner::Timings::immediate(),
            ..Default::default()
        };
        RunController::new(Arc::new(factory), flow, SessionOptions::default())
    }

    async fn app_with_state(store: Option<LogStore>) -> (Router, Arc<AppState>) {
        let state = AppState::new(
            controller(MockFactory::failing("no browser")),
            store,
            Observers::new(),
        )
        .await
        .unwrap();
        let state = Arc::new(state);
        (super::super::router(state.clone()), state)
    }

    async fn app(store: Option<LogStore>) -> Router {
        app_with_state(store).await.0
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn start(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/start_test")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn status(id: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/status/{}", id))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_and_poll_until_completed() {
        let app = app(None).await;

        let (code, body) = call(
            &app,
            start(serde_json::json!({"url": "https://shop.example", "modo": "Rápida"})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "Test initiated");
        assert_eq!(body["session_id"], "TestandoSite_1");

        let mut last = Value::Null;
        for _ in 0..100 {
            let (code, body) = call(&app, status("TestandoSite_1")).await;
            assert_eq!(code, StatusCode::OK);
            last = body;
            if last["status"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["progress"], 100);
        assert_eq!(last["results"][0]["step"], "Browser Session");
        assert_eq!(last["results"][0]["status"], "failure");
        assert_eq!(last["results"][0]["error_message"], "no browser");
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = app(None).await;
        let (code, body) = call(&app, status("TestandoSite_42")).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found");
    }

    #[tokio::test]
    async fn test_bad_mode_rejected() {
        let app = app(None).await;
        let (code, _) = call(
            &app,
            start(serde_json::json!({"url": "https://shop.example", "mode": "turbo"})),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_counter_and_history_from_store() {
        let store = LogStore::connect("sqlite::memory:").await.unwrap();
        for (seq, id) in ["TestandoSite_5", "TestandoSite_7"].iter().enumerate() {
            let outcome = StepOutcome::new(StepKind::Load, StepStatus::Success).message("Loaded");
            store
                .append(&LogEntry {
                    session_id: id.to_string(),
                    seq: seq as i64,
                    outcome,
                })
                .await
                .unwrap();
        }
        let app = app(Some(store)).await;

        let (_, body) = call(
            &app,
            start(serde_json::json!({"url": "https://shop.example", "modo": "Avançada"})),
        )
        .await;
        assert_eq!(body["session_id"], "TestandoSite_8");

        let (code, body) = call(&app, status("TestandoSite_5")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["results"][0]["message"], "Loaded");
        assert_eq!(body["results"][0]["response_time"], Value::Null);
    }

    #[tokio::test]
    async fn test_finished_run_served_from_store_after_release() {
        let store = LogStore::connect("sqlite::memory:").await.unwrap();
        let (app, state) = app_with_state(Some(store.clone())).await;

        let (_, body) = call(
            &app,
            start(serde_json::json!({"url": "https://shop.example"})),
        )
        .await;
        let id = body["session_id"].as_str().unwrap().to_string();

        for _ in 0..100 {
            if state.registry.get(&id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.registry.get(&id).is_none());
        assert_eq!(state.registry.len(), 0);
        // Released only after its rows reached the store
        assert!(!store.session_rows(&id).await.unwrap().is_empty());

        let (code, body) = call(&app, status(&id)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["results"][0]["step"], "Browser Session");
        assert_eq!(body["results"][0]["status"], "failure");
    }

    #[tokio::test]
    async fn test_finished_run_kept_without_store() {
        let (app, state) = app_with_state(None).await;
        call(&app, start(serde_json::json!({"url": "https://shop.example"}))).await;

        let mut body = Value::Null;
        for _ in 0..100 {
            body = call(&app, status("TestandoSite_1")).await.1;
            if body["status"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(body["status"], "completed");
        // Give the spawned task time to release the entry if it were going to
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.registry.get("TestandoSite_1").is_some());
    }
}
