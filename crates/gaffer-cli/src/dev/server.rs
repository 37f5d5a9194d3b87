//! HTTP side of the development server.
//!
//! Serves the frontend output under the public path, pushes [`DevEvent`]s
//! over Server-Sent Events and reports build status as JSON.
//!
//! [`DevEvent`]: crate::dev::DevEvent

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use gaffer_config::DevServerSettings;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::dev::{DevEvent, ServiceHandle, SharedState};
use crate::error::{CliError, Result};

pub const EVENTS_PATH: &str = "/__gaffer/events";
pub const STATUS_PATH: &str = "/__gaffer/status";

/// Development server.
pub struct DevServer {
    host: String,
    port: u16,
    public_path: String,
    state: SharedState,
}

impl DevServer {
    pub fn new(settings: &DevServerSettings, state: SharedState) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            public_path: settings.public_path.clone(),
            state,
        }
    }

    /// Bind the listener and serve in the background.
    ///
    /// # Errors
    ///
    /// Returns error if server cannot bind to configured address
    pub async fn start(self) -> Result<ServiceHandle> {
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind to {}:{}: {}", self.host, self.port, e)))?;
        let addr = listener.local_addr()?;

        let app = self.router();
        crate::ui::success(&format!("Development server running at http://{addr}"));

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .map_err(|e| CliError::Server(format!("Server error: {}", e)))
        });
        Ok(ServiceHandle::new(addr, task))
    }

    fn router(&self) -> Router {
        let files = ServeDir::new(self.state.out_dir());
        let router = Router::new()
            .route(EVENTS_PATH, get(handle_sse))
            .route(STATUS_PATH, get(handle_status));

        // axum does not nest at the root
        let prefix = self.public_path.trim_end_matches('/');
        let router = if prefix.is_empty() {
            router.fallback_service(files)
        } else {
            router.nest_service(prefix, files)
        };

        router
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.state.clone())
    }
}

async fn handle_sse(State(state): State<SharedState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    tracing::debug!(client = id, "sse client connected");
    state.broadcast(&DevEvent::ClientConnected { id });

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

async fn handle_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.snapshot())
}
