pub mod handlers;
pub mod routes;

pub use handlers::ApiError;
pub use routes::{api_routes, router};

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use voltra_domain::{DomainResult, ReadingCache, TimeSeriesStore};

/// Shared state for API handlers.
pub struct AppState {
    pub cache: Arc<dyn ReadingCache>,
    pub store: Arc<dyn TimeSeriesStore>,
}

/// HTTP read surface over the reading cache and the time-series store.
pub struct TelemetryApi {
    bind_addr: String,
    state: Arc<AppState>,
}

impl TelemetryApi {
    pub fn new(
        bind_addr: impl Into<String>,
        cache: Arc<dyn ReadingCache>,
        store: Arc<dyn TimeSeriesStore>,
    ) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            state: Arc::new(AppState { cache, store }),
        }
    }

    /// Serve the API until the cancellation token fires.
    pub async fn serve(&self, cancellation_token: CancellationToken) -> DomainResult<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("failed to bind API listener on {}", self.bind_addr))?;

        info!(bind_addr = %self.bind_addr, "telemetry API listening");

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(cancellation_token.cancelled_owned())
            .await
            .context("telemetry API server error")?;

        info!("telemetry API stopped");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), anyhow::Error>> + Send>,
            > + Send,
    > {
        Box::new(move |cancellation_token: CancellationToken| {
            Box::pin(async move {
                self.serve(cancellation_token)
                    .await
                    .map_err(anyhow::Error::from)
            })
        })
    }
}
