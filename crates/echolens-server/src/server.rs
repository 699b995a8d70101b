use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use echolens_engine::AnalysisPipeline;

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9191,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    /// Parent of every analysis token. Cancelled on server shutdown.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<AnalysisPipeline>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            shutdown,
            started_at: Utc::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(handlers::analyze))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    pipeline: Arc<AnalysisPipeline>,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = CancellationToken::new();
    let router = build_router(AppState::new(pipeline, shutdown.clone()));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "echolens server started");

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections, cancel running analyses, and wait for
    /// their streams to close.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
    }

    /// Wait until the server stops on its own.
    pub async fn wait(self) {
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echolens_core::agents::{Roster, ADVOCATE, SKEPTIC, SYNTHESIZER};
    use echolens_engine::PipelineConfig;
    use echolens_llm::{MockProvider, MockResponse};
    use std::time::Duration;

    fn pipeline() -> Arc<AnalysisPipeline> {
        Arc::new(AnalysisPipeline::new(
            Arc::new(MockProvider::new()),
            Roster::default(),
            PipelineConfig::default(),
        ))
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9191);
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let handle = start(config, pipeline()).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "mock");
        assert_eq!(body["model"], "mock-model");
        assert_eq!(
            body["roster"],
            serde_json::json!(["Advocate", "Skeptic", "Synthesizer"])
        );
        assert!(body["startedAt"].is_string());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let handle = start(
            ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            pipeline(),
        )
        .await
        .unwrap();

        let url = format!("http://127.0.0.1:{}/nope", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 404);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_open_analysis_streams() {
        let mock = MockProvider::new()
            .on(ADVOCATE.persona, MockResponse::Hang)
            .on(SKEPTIC.persona, MockResponse::Hang)
            .on(SYNTHESIZER.persona, MockResponse::Hang);
        let pipeline = Arc::new(AnalysisPipeline::new(
            Arc::new(mock),
            Roster::default(),
            PipelineConfig::default(),
        ));
        let handle = start(
            ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            pipeline,
        )
        .await
        .unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/api/analyze", handle.port))
            .json(&serde_json::json!({ "videoUrl": "u", "userPrompt": "p" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let stopped = tokio::time::timeout(Duration::from_secs(3), handle.shutdown()).await;
        assert!(stopped.is_ok(), "shutdown waited on an open analysis");

        let body = resp.text().await.unwrap();
        assert!(body.contains(r#""kind":"cancelled""#));
    }
}
