//! Development HTTP server.
//!
//! Every request that isn't the HMR client or socket goes through
//! [`BuildOrchestrator::serve`]. Responses carry a strong `ETag`, so an
//! unchanged module costs the browser a 304.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use kiln_build::{BuildOrchestrator, HMR_CLIENT_URL};
use kiln_config::KilnConfig;
use kiln_graph::HmrEngine;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{CliError, Result};

const HMR_CLIENT: &str = include_str!("../../assets/hmr-client.js");
const HMR_PATH_PLACEHOLDER: &str = "__KILN_HMR_PATH__";

#[derive(Clone)]
struct AppState {
    orchestrator: BuildOrchestrator,
    hmr_client: Arc<str>,
}

/// Development server.
pub struct DevServer {
    addr: String,
    hmr: bool,
    hmr_path: String,
    orchestrator: BuildOrchestrator,
}

impl DevServer {
    pub fn new(config: &KilnConfig, orchestrator: BuildOrchestrator) -> Self {
        Self {
            addr: config.addr(),
            hmr: config.dev.hmr,
            hmr_path: config.dev.hmr_path.clone(),
            orchestrator,
        }
    }

    /// URL printed for the user.
    pub fn server_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Build the axum router.
    ///
    /// - `GET /__kiln__/hmr-client.js`: the browser HMR runtime
    /// - `GET <hmr_path>`: WebSocket attached to the HMR engine (when enabled)
    /// - everything else: built modules and static files
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            hmr_client: HMR_CLIENT.replace(HMR_PATH_PLACEHOLDER, &self.hmr_path).into(),
        };

        let mut router = Router::new().route(HMR_CLIENT_URL, get(handle_hmr_client));
        if self.hmr {
            router = router.route(&self.hmr_path, get(handle_hmr_socket));
        }

        router
            .fallback(handle_request)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }

    /// Bind and serve until the task is dropped.
    pub async fn start(self) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", self.addr, e)))?;

        crate::ui::success(&format!("Dev server running at {}", self.server_url()));

        axum::serve(listener, app)
            .await
            .map_err(|e| CliError::Server(format!("Server error: {}", e)))
    }
}

async fn handle_hmr_client(State(state): State<AppState>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        state.hmr_client.to_string(),
    )
        .into_response()
}

async fn handle_hmr_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let engine = state.orchestrator.hmr().clone();
    ws.on_upgrade(move |socket| hmr_session(socket, engine))
}

/// Forward engine batches to one browser and feed its messages back.
async fn hmr_session(socket: WebSocket, engine: Arc<HmrEngine>) {
    let (id, mut rx) = engine.register_client();
    tracing::debug!(client = id, "HMR client connected");

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let incoming = engine.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => incoming.handle_client_message(text.as_str()),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    engine.unregister_client(id);
    tracing::debug!(client = id, "HMR client disconnected");
}

async fn handle_request(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    match state.orchestrator.serve(url).await {
        Ok(served) => {
            let fresh = headers
                .get(header::IF_NONE_MATCH)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|etag| etag == served.etag);
            if fresh {
                return (StatusCode::NOT_MODIFIED, [(header::ETAG, served.etag)]).into_response();
            }

            (
                [
                    (header::CONTENT_TYPE, served.content_type.to_string()),
                    (header::ETAG, served.etag),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                served.body,
            )
                .into_response()
        }
        Err(err) if err.is_not_found() => {
            tracing::debug!(url, "not found");
            (StatusCode::NOT_FOUND, format!("Not found: {}", uri.path())).into_response()
        }
        Err(err) => {
            tracing::error!(url, error = %err, "failed to serve");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
