//! HTTP boundary for the cart-to-order commit pipeline.
//!
//! Provides REST endpoints for carts, checkout and order lookup, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CartLocks, CartService, CheckoutConfig, CheckoutOrchestrator, Notifier, PostCommitNotifier,
    SessionCarts,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store, N: Notifier> {
    pub store: S,
    pub carts: CartService<S>,
    pub checkout: CheckoutOrchestrator<S, N>,
    pub locks: CartLocks,
    pub sessions: SessionCarts,
}

/// Wires the cart service and the orchestrator over one store, sharing the
/// session carts and the cart lock registry between them.
pub fn create_state<S, N>(store: S, notifier: N, config: &CheckoutConfig) -> Arc<AppState<S, N>>
where
    S: Store + Clone,
    N: Notifier,
{
    let sessions = SessionCarts::new();
    let locks = CartLocks::new(config.lock_timeout);

    Arc::new(AppState {
        carts: CartService::new(store.clone(), sessions.clone(), locks.clone()),
        checkout: CheckoutOrchestrator::new(
            store.clone(),
            sessions.clone(),
            locks.clone(),
            PostCommitNotifier::new(notifier, config),
        ),
        store,
        locks,
        sessions,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store + Clone + 'static,
    N: Notifier,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S, N>))
        .route(
            "/cart",
            get(routes::cart::view::<S, N>).delete(routes::cart::clear::<S, N>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S, N>))
        .route(
            "/cart/items/{product_id}",
            put(routes::cart::update_item::<S, N>).delete(routes::cart::remove_item::<S, N>),
        )
        .route("/checkout", post(routes::checkout::place_order::<S, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, N>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
