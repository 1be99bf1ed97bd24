//! Development server
//!
//! Serves the output root over HTTP, injects the reload client into HTML
//! responses and pushes [`ReloadMessage`]s to connected pages over a
//! websocket.

pub mod reload;

pub use reload::{ReloadHub, ReloadMessage};

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::build::pipeline::{Job, PipelineError};
use crate::build::result::TaskResult;
use crate::config::schema::ServerConfig;
use reload::{inject_client, CLIENT_SCRIPT, CLIENT_SCRIPT_PATH, SOCKET_PATH};

/// Job name of the server
pub const SERVER: &str = "server";

/// Error running the development server
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// The server stopped with an I/O error
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone)]
struct ServerState {
    hub: ReloadHub,
}

/// Router serving `root` with live reload.
pub fn router(root: impl Into<PathBuf>, hub: ReloadHub) -> Router {
    let files = ServeDir::new(root.into()).append_index_html_on_directories(true);

    Router::new()
        .route(CLIENT_SCRIPT_PATH, get(client_script))
        .route(SOCKET_PATH, get(socket))
        .fallback_service(files)
        .layer(middleware::from_fn(inject_reload))
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { hub })
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], CLIENT_SCRIPT)
}

/// Add the reload client tag to full HTML responses.
async fn inject_reload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false);
    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

async fn socket(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: ReloadHub) {
    let mut updates = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(clients = hub.client_count(), "reload client connected");

    loop {
        tokio::select! {
            update = updates.recv() => {
                let message = match update {
                    Ok(message) => message,
                    // Missed updates; a full reload covers them all.
                    Err(RecvError::Lagged(_)) => ReloadMessage::Reload,
                    Err(RecvError::Closed) => break,
                };
                if sender.send(Message::Text(message.to_json())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("reload client disconnected");
}

/// Wait for Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Serve `root` until a shutdown signal arrives.
pub async fn serve(config: &ServerConfig, root: PathBuf, hub: ReloadHub) -> Result<(), ServerError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;

    tracing::info!(root = %root.display(), "serving on http://{}", addr);

    axum::serve(listener, router(root, hub)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Pipeline job running the development server.
pub struct ServerJob {
    config: ServerConfig,
    root: PathBuf,
    hub: ReloadHub,
}

impl ServerJob {
    pub fn new(config: ServerConfig, root: impl Into<PathBuf>, hub: ReloadHub) -> Self {
        Self { config, root: root.into(), hub }
    }
}

#[async_trait::async_trait]
impl Job for ServerJob {
    fn name(&self) -> &str {
        SERVER
    }

    async fn run(&self) -> Result<TaskResult, PipelineError> {
        serve(&self.config, self.root.clone(), self.hub.clone())
            .await
            .map_err(|e| PipelineError::job(SERVER, e))?;
        Ok(TaskResult::success(SERVER, vec![], Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn get_path(app: Router, path: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(HttpRequest::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    fn site() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("styles")).unwrap();
        fs::write(temp.path().join("index.html"), "<html><body><h1>Hi</h1></body></html>").unwrap();
        fs::write(temp.path().join("styles/main.css"), "h1{color:red}").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_index_served_with_reload_client() {
        let temp = site();
        let (status, _, body) = get_path(router(temp.path(), ReloadHub::new()), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>Hi</h1>"));
        assert!(body.contains(r#"<script src="/__sitepack/reload.js"></script></body>"#));
    }

    #[tokio::test]
    async fn test_css_served_untouched() {
        let temp = site();
        let (status, content_type, body) =
            get_path(router(temp.path(), ReloadHub::new()), "/styles/main.css").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/css"));
        assert_eq!(body, "h1{color:red}");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let temp = site();
        let (status, _, _) = get_path(router(temp.path(), ReloadHub::new()), "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_client_script_route() {
        let temp = site();
        let (status, content_type, body) =
            get_path(router(temp.path(), ReloadHub::new()), CLIENT_SCRIPT_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("application/javascript"));
        assert!(body.contains(SOCKET_PATH));
    }

    #[tokio::test]
    async fn test_bind_error_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ServerConfig { host: "127.0.0.1".to_string(), port };

        let err = serve(&config, PathBuf::from("."), ReloadHub::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
