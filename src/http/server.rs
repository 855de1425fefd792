//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router around the edge handler
//! - Wire up middleware (request id, tracing, timeout)
//! - Own the origin client, the cache store and the background task registry
//! - Swap compiled rules when a new configuration arrives
//! - Drain pending cache writes on graceful shutdown

use arc_swap::ArcSwap;
use axum::{body::Body, http::Request, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::{CacheCoordinator, MemoryStore};
use crate::config::EdgeConfig;
use crate::http::pipeline::{edge_handler, AppState, Runtime};
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::background::BackgroundTasks;
use crate::observability::metrics;
use crate::rewrite::RewriteError;

/// How often expired entries are swept from the memory store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The edge server: cache and rewrite pipeline in front of one origin.
pub struct EdgeServer {
    router: Router,
    config: EdgeConfig,
    runtime: Arc<ArcSwap<Runtime>>,
    store: Arc<MemoryStore>,
    tasks: BackgroundTasks,
}

impl EdgeServer {
    /// Create a new server. Fails when the rewrite rules do not compile.
    pub fn new(config: EdgeConfig) -> Result<Self, RewriteError> {
        let runtime = Arc::new(ArcSwap::from_pointee(Runtime::compile(&config)?));
        let store = Arc::new(MemoryStore::new(config.cache.max_entries));
        let tasks = BackgroundTasks::new();

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            runtime: runtime.clone(),
            cache: CacheCoordinator::new(store.clone(), tasks.clone(), config.cache.enabled),
            client,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            runtime,
            store,
            tasks,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EdgeConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        request_id = %request_id,
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/{*path}", any(edge_handler))
            .route("/", any(edge_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires, then drain pending cache writes.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<EdgeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.address,
            mode = ?self.config.rewrite.mode,
            "Edge server starting"
        );

        let runtime = self.runtime.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match Runtime::compile(&config) {
                    Ok(compiled) => {
                        runtime.store(Arc::new(compiled));
                        tracing::info!("Configuration reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded configuration, keeping current rules");
                    }
                }
            }
        });

        let store = self.store.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = store.sweep(SystemTime::now());
                if evicted > 0 {
                    tracing::debug!(evicted, "Swept expired cache entries");
                }
                metrics::record_cache_entries(store.len());
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, no longer accepting connections");
            })
            .await?;

        reloader.abort();
        sweeper.abort();

        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        if !self.tasks.drain(drain).await {
            tracing::warn!(
                pending = self.tasks.in_flight(),
                "Abandoning cache writes still pending after drain timeout"
            );
        }

        tracing::info!("Edge server stopped");
        Ok(())
    }
}
