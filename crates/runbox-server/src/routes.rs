//! HTTP and WebSocket routes for the runbox server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Router,
    extract::{
        Path as AxumPath, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use runbox_core::{ExecutionEngine, OutputEvent, OutputSink};

use crate::artifacts::ArtifactStore;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{
    ClientMessage, InputRequest, InputResponse, PublishApiRequest, PublishResponse, ServerMessage,
    StopRequest, StopResponse,
};

/// Application state shared across handlers.
pub struct AppState {
    /// The execution engine.
    pub engine: Arc<ExecutionEngine>,
    /// Published archives, for download.
    pub artifacts: Mutex<ArtifactStore>,
}

impl AppState {
    /// State around `engine` with no published artifacts.
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            artifacts: Mutex::new(ArtifactStore::default()),
        }
    }

    fn artifact(&self, id: &str, file: &str) -> Option<PathBuf> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id, file)
    }

    /// Make `archive` downloadable; returns its URL.
    pub fn register_artifact(&self, archive: &Path) -> Option<String> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(archive)
            .map(|key| format!("/api/publish/{}", key))
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/input", post(input_handler))
        .route("/api/stop", post(stop_handler))
        .route("/api/publish", post(publish_handler))
        .route("/api/publish/{id}/{file}", get(download_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Deliver a line of input to a running session.
async fn input_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InputRequest>,
) -> Json<InputResponse> {
    let success = state.engine.provide_input(&request.session_id, &request.text);
    Json(InputResponse { success })
}

/// Stop a running session.
async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StopRequest>,
) -> Json<StopResponse> {
    let stopped = state.engine.stop(&request.session_id);
    Json(StopResponse::from_stopped(stopped))
}

/// Build a downloadable archive.
async fn publish_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishApiRequest>,
) -> Json<PublishResponse> {
    let result = state
        .engine
        .publish(request.into_publish_request(), Arc::new(BuildLogSink))
        .await;

    let download_url = result
        .artifact_path
        .as_deref()
        .and_then(|path| state.register_artifact(path));

    Json(PublishResponse::new(result, download_url))
}

/// Download a published archive.
async fn download_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((id, file)): AxumPath<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    let path = state
        .artifact(&id, &file)
        .ok_or_else(|| ServerError::NotFound(format!("{}/{}", id, file)))?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| ServerError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file),
            ),
        ],
        bytes,
    ))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Streams the events of one run into a connection's outgoing queue.
struct ConnectionSink {
    session_id: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl OutputSink for ConnectionSink {
    fn emit(&self, event: OutputEvent) {
        // Closed connection: the run keeps going until stopped.
        let _ = self.tx.send(ServerMessage::event(self.session_id.clone(), event));
    }
}

/// Publish output goes to the server log; the response carries it too.
struct BuildLogSink;

impl OutputSink for BuildLogSink {
    fn emit(&self, event: OutputEvent) {
        tracing::debug!("[publish] {}", event.content.trim_end());
    }
}

/// Handle WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut started: Vec<String> = Vec::new();
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(msg, &state, &tx, &mut started),
                Err(e) => {
                    tracing::warn!("Failed to parse client message: {} (input: {})", e, text);
                    let _ = tx.send(ServerMessage::ProtocolError {
                        message: format!("Invalid message format: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Runs started by this connection have nobody left to report to.
    for session_id in started {
        if state.engine.stop(&session_id) {
            tracing::info!("Stopped session {} after client disconnect", session_id);
        }
    }
    forward_task.abort();
}

/// Handle a client message.
fn handle_client_message(
    msg: ClientMessage,
    state: &Arc<AppState>,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    started: &mut Vec<String>,
) {
    match msg {
        ClientMessage::Run {
            program,
            session_id,
        } => {
            let session_id = session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let _ = tx.send(ServerMessage::Started {
                session_id: session_id.clone(),
            });
            started.push(session_id.clone());

            let sink: Arc<dyn OutputSink> = Arc::new(ConnectionSink {
                session_id: session_id.clone(),
                tx: tx.clone(),
            });
            let request = program.into_execution_request(session_id);
            let engine = state.engine.clone();
            // Runs in its own task so input and stop messages keep flowing.
            tokio::spawn(async move {
                engine.run(request, sink).await;
            });
        }

        ClientMessage::Input { session_id, text } => {
            let accepted = state.engine.provide_input(&session_id, &text);
            let _ = tx.send(ServerMessage::InputResult {
                session_id,
                accepted,
            });
        }

        ClientMessage::Stop { session_id } => {
            let stopped = state.engine.stop(&session_id);
            let _ = tx.send(ServerMessage::StopResult {
                session_id,
                stopped,
            });
        }
    }
}
