//! Application startup and lifecycle management.

use crate::config::BankreconConfig;
use crate::engine::{AllocationTracker, DifferenceClassifier, ReversalEngine, SuggestionEngine};
use crate::handlers;
use crate::services::{
    init_metrics, AllocationStore, CandidateSource, HttpCandidateSource, HttpLedgerPoster,
    LedgerPoster, MemoryStore, PgStore, ReconciliationLedger, ReconciliationStore,
    StaticCandidateSource,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BankreconConfig,
    pub store: Arc<dyn ReconciliationStore>,
    pub allocations: Arc<dyn AllocationStore>,
    pub suggestions: Arc<SuggestionEngine>,
    pub classifier: Arc<DifferenceClassifier>,
    pub ledger: Arc<ReconciliationLedger>,
    pub reversals: Arc<ReversalEngine>,
    pub allocator: Arc<AllocationTracker>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, assembling the
    /// store and collaborator clients from it.
    pub async fn build(config: BankreconConfig) -> Result<Self, AppError> {
        init_metrics();

        let (store, allocations): (Arc<dyn ReconciliationStore>, Arc<dyn AllocationStore>) =
            match &config.database {
                Some(db) => {
                    let pg = Arc::new(
                        PgStore::new(&db.url, db.max_connections, db.min_connections).await?,
                    );
                    pg.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                    (pg.clone(), pg)
                }
                None => {
                    tracing::warn!(
                        "DATABASE_URL not configured - running with the in-memory store, \
                         state will not survive a restart"
                    );
                    let memory = Arc::new(MemoryStore::new());
                    (memory.clone(), memory)
                }
            };

        let candidates: Arc<dyn CandidateSource> = match &config.books_service.url {
            Some(url) => {
                tracing::info!(endpoint = %url, "Using books service as candidate source");
                Arc::new(HttpCandidateSource::new(url))
            }
            None => {
                tracing::warn!(
                    "BOOKS_SERVICE_URL not configured - candidate pools will be empty \
                     until records are seeded"
                );
                Arc::new(StaticCandidateSource::new())
            }
        };

        let poster: Arc<dyn LedgerPoster> =
            Arc::new(HttpLedgerPoster::new(&config.ledger_service.url));

        Self::build_with_dependencies(config, store, allocations, candidates, poster).await
    }

    /// Build the application around externally supplied dependencies.
    /// Used by tests to inject the in-memory store and collaborator doubles.
    pub async fn build_with_dependencies(
        config: BankreconConfig,
        store: Arc<dyn ReconciliationStore>,
        allocations: Arc<dyn AllocationStore>,
        candidates: Arc<dyn CandidateSource>,
        poster: Arc<dyn LedgerPoster>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let matching = config.matching.clone();
        let state = AppState {
            suggestions: Arc::new(SuggestionEngine::new(candidates, matching.clone())),
            classifier: Arc::new(DifferenceClassifier::new(matching.clone())),
            ledger: Arc::new(ReconciliationLedger::new(store.clone(), poster.clone())),
            reversals: Arc::new(ReversalEngine::new(store.clone(), poster, matching)),
            allocator: Arc::new(AllocationTracker::new(allocations.clone())),
            config,
            store,
            allocations,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the application state.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            .route(
                "/transactions",
                post(handlers::transactions::create_transaction),
            )
            .route(
                "/transactions/:transaction_id",
                get(handlers::transactions::get_transaction),
            )
            .route(
                "/transactions/:transaction_id/suggestions",
                get(handlers::suggestions::get_suggestions),
            )
            .route(
                "/transactions/:transaction_id/difference-preview",
                get(handlers::reconcile::difference_preview),
            )
            .route(
                "/transactions/:transaction_id/reconcile",
                post(handlers::reconcile::reconcile_transaction),
            )
            .route(
                "/transactions/:transaction_id/unreconcile",
                post(handlers::reconcile::unreconcile_transaction),
            )
            .route(
                "/transactions/:transaction_id/reversal-detection",
                get(handlers::reversals::reversal_detection),
            )
            .route("/reversal-pairs", post(handlers::reversals::pair_reversal))
            .route(
                "/candidates/search",
                get(handlers::suggestions::search_candidates),
            )
            .route("/allocations", post(handlers::allocations::allocate))
            .route(
                "/allocations/:payment_id",
                get(handlers::allocations::get_payment_allocations)
                    .delete(handlers::allocations::unallocate_all),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "bankrecon-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
