//! HTTP control plane and websocket relay endpoint.

pub mod routes;
pub mod ws;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::camera::CameraCatalog;
use crate::config::ProxyConfig;
use crate::registry::{ProcessRegistry, RegistrySettings};
use crate::relay::{LiveRelayPublisher, RelaySettings};
use crate::segmented::{SegmentLayout, SegmentedPublisher};
use crate::transcoder::{FfmpegInvocation, InvocationBuilder};

/// Shared handler state.
pub struct AppState {
    pub catalog: Arc<CameraCatalog>,
    pub segmented: SegmentedPublisher,
    pub relay: LiveRelayPublisher,
}

pub struct ProxyServer {
    state: Arc<AppState>,
    registry: Arc<ProcessRegistry>,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Wire the publishers to the ffmpeg invocation described by `config`.
    pub fn from_config(config: ProxyConfig) -> Self {
        let invocation: Arc<dyn InvocationBuilder> = Arc::new(FfmpegInvocation::new(&config));
        Self::new(config, invocation)
    }

    pub fn new(config: ProxyConfig, invocation: Arc<dyn InvocationBuilder>) -> Self {
        let catalog = Arc::new(CameraCatalog::new(config.cameras.clone()));
        let registry = Arc::new(ProcessRegistry::new(
            Arc::clone(&invocation),
            RegistrySettings::from(&config.transcoder),
        ));
        let segmented = SegmentedPublisher::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            SegmentLayout::new(&config.server.streams_dir, &config.segmented),
            config.segmented.clone(),
        );
        let relay = LiveRelayPublisher::new(
            invocation,
            RelaySettings::from_config(&config.relay, &config.transcoder),
        );

        Self {
            state: Arc::new(AppState {
                catalog,
                segmented,
                relay,
            }),
            registry,
            config,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/cameras", get(routes::list_cameras))
            .route("/cameras/{camera_id}/hls/start", post(routes::start_hls))
            .route("/cameras/{camera_id}/hls/stop", post(routes::stop_hls))
            .route("/cameras/{camera_id}/hls/status", get(routes::hls_status))
            .route("/stream/{camera_id}", get(routes::relay_stream))
            .nest_service("/streams", ServeDir::new(&self.config.server.streams_dir));

        if let Some(static_dir) = &self.config.server.static_dir {
            app = app.nest_service("/static", ServeDir::new(static_dir));
        }

        app.layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Serve on `listener` until `shutdown` resolves, then stop every
    /// segmented transcoder.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::fs::create_dir_all(&self.config.server.streams_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create streams directory {}",
                    self.config.server.streams_dir.display()
                )
            })?;

        let addr = listener.local_addr()?;
        info!(
            "Camera proxy listening on http://{} ({} camera(s))",
            addr,
            self.state.catalog.len()
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed");

        self.shutdown().await;
        result
    }

    pub async fn shutdown(&self) {
        info!("Shutting down, stopping transcoders");
        self.registry.stop_all().await;
    }
}
