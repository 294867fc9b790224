//! Application startup and lifecycle management.

use axum::{
    routing::{get, post},
    Router,
};
use facturacion_core::error::AppError;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::services::artifacts::{ArtifactStorage, LocalArtifactStorage};
use crate::services::dian::HttpDianGateway;
use crate::services::gateway::DianGateway;
use crate::services::store::{InvoiceStore, PgInvoiceStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn InvoiceStore>,
    pub gateway: Arc<dyn DianGateway>,
    pub artifacts: Arc<dyn ArtifactStorage>,
}

/// Build the HTTP router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/invoices", post(handlers::invoices::issue_invoice))
        .route(
            "/invoices/status",
            get(handlers::invoices::invoice_status).post(handlers::invoices::poll_status),
        )
        .route("/invoices/webhook", post(handlers::webhook::dian_webhook))
        .route(
            "/invoices/:invoice_id/pdf",
            post(handlers::invoices::generate_pdf),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the production application: PostgreSQL store (with migrations),
    /// HTTP gateway and filesystem artifact storage.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store = PgInvoiceStore::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        store.run_migrations().await?;

        let gateway = HttpDianGateway::new(config.dian.clone(), config.pipeline.stage_timeout)?;

        let artifacts = LocalArtifactStorage::new(
            config.artifacts.base_path.clone(),
            config.artifacts.public_base_url.clone(),
        )
        .await?;

        let host = config.server.host.clone();
        let port = config.server.port;

        let state = AppState {
            config: Arc::new(config),
            store: Arc::new(store),
            gateway: Arc::new(gateway),
            artifacts: Arc::new(artifacts),
        };

        Self::with_state(state, &host, port).await
    }

    /// Bind a listener for an already assembled state (port 0 = random port
    /// for testing).
    pub async fn with_state(state: AppState, host: &str, port: u16) -> Result<Self, AppError> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}:{}: {}", host, port, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "facturacion-service listening");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, api_router(self.state)).await
    }
}
