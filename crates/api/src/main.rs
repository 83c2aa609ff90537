//! API server entry point.

use std::time::Duration;

use api::config::{Config, LogFormat};
use checkout::{CheckoutConfig, LogNotifier};
use domain::{Money, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryStore, PostgresStore, Store};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How often idle session carts and unused lock entries are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Products available when running without a database.
fn demo_catalog() -> Vec<Product> {
    vec![
        Product::new(
            "SKU-001",
            "Espresso Beans",
            "1kg bag, dark roast",
            Money::from_cents(1899),
            50,
        ),
        Product::new(
            "SKU-002",
            "Pour-over Kettle",
            "Gooseneck, 1L",
            Money::from_cents(4500),
            10,
        ),
        Product::new(
            "SKU-003",
            "Paper Filters",
            "Pack of 100",
            Money::from_cents(599),
            200,
        ),
    ]
}

async fn serve<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
    checkout_config: &CheckoutConfig,
    metrics_handle: PrometheusHandle,
) {
    let state = api::create_state(store, LogNotifier, checkout_config);

    let sweeper = state.clone();
    let session_ttl = checkout_config.session_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.sessions.evict_idle(session_ttl).await;
            metrics::gauge!("session_carts_active").set(sweeper.sessions.len().await as f64);

            let released = sweeper.locks.release_idle().await;
            metrics::gauge!("cart_locks_active").set(sweeper.locks.len().await as f64);
            if released > 0 {
                tracing::debug!(released, "released idle cart locks");
            }
        }
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);
    let checkout_config = CheckoutConfig::from_env();
    tracing::info!(?checkout_config, "checkout configuration loaded");

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Select the store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::with_lock_timeout(pool, checkout_config.lock_timeout);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(store, &config, &checkout_config, metrics_handle).await;
        }
        None => {
            let store = InMemoryStore::with_lock_timeout(checkout_config.lock_timeout);
            for product in demo_catalog() {
                store
                    .put_product(&product)
                    .await
                    .expect("failed to seed catalog");
            }
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo catalog");
            serve(store, &config, &checkout_config, metrics_handle).await;
        }
    }
}
