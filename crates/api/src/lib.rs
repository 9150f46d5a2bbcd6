//! HTTP API server with observability for cart and checkout.
//!
//! Provides REST endpoints for cart browsing, cart mutation, checkout and
//! order lookup, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::{CheckoutConfig, CheckoutOrchestrator, NotificationSink};
use domain::{Money, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CartStore, InMemoryStore, OrderStore, StockLedger};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// A record store that can back every route: carts, stock and orders.
pub trait Backend: CartStore + StockLedger + OrderStore + Clone + 'static {}

impl<S> Backend for S where S: CartStore + StockLedger + OrderStore + Clone + 'static {}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Backend>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/customers/{customer_id}/cart",
            get(routes::cart::get::<S>)
                .post(routes::cart::add::<S>)
                .delete(routes::cart::clear::<S>),
        )
        .route(
            "/cart/lines/{line_id}",
            patch(routes::cart::set_quantity::<S>).delete(routes::cart::remove_line::<S>),
        )
        .route(
            "/customers/{customer_id}/checkout",
            post(routes::checkout::checkout::<S>),
        )
        .route(
            "/customers/{customer_id}/orders",
            get(routes::orders::list::<S>),
        )
        .route("/orders/{order_id}", get(routes::orders::get::<S>))
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

/// Creates the application state: one orchestrator over a single backend.
pub fn create_state<S: Backend>(
    store: S,
    config: CheckoutConfig,
    notifier: Arc<dyn NotificationSink>,
) -> Arc<AppState<S>> {
    let checkout = CheckoutOrchestrator::new(store.clone(), store.clone(), store, notifier, config);
    Arc::new(AppState { checkout })
}

/// Products available when the server runs without a database.
pub fn demo_catalog() -> Vec<Product> {
    vec![
        Product::new("SKU-001", "Widget", Money::from_cents(1000), 50),
        Product::new("SKU-002", "Gadget", Money::from_cents(2500), 20),
        Product::new("SKU-003", "Gizmo", Money::from_cents(499), 100),
        Product::new("SKU-004", "Doohickey", Money::from_cents(12900), 3),
    ]
}

/// Loads [`demo_catalog`] into an in-memory store.
pub async fn seed_demo_catalog(store: &InMemoryStore) {
    for product in demo_catalog() {
        store.insert_product(product).await;
    }
}
