//! Binary that serves the checkout HTTP API.

use std::sync::Arc;

use api::Backend;
use api::config::{Config, LogFormat};
use checkout::TracingNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Resolves once the process is asked to stop, either by Ctrl-C or, on
/// unix, by SIGTERM from the supervisor.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        let mut sigterm =
            unix_signal(SignalKind::terminate()).expect("SIGTERM handler could not be installed");
        let received = tokio::select! {
            result = signal::ctrl_c() => {
                result.expect("SIGINT handler could not be installed");
                "SIGINT"
            }
            _ = sigterm.recv() => "SIGTERM",
        };
        tracing::info!(signal = received, "draining in-flight requests");
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl-c handler failed, stopping now");
        }
        tracing::info!(signal = "ctrl-c", "draining in-flight requests");
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: Backend>(config: &Config, store: S, metrics_handle: PrometheusHandle) {
    let state = api::create_state(store, config.checkout, Arc::new(TracingNotifier));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "checkout API listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("cannot bind {addr}: {err}"));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server terminated abnormally");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Without a database the server still runs, against seeded demo data.
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to PostgreSQL")
                .with_statement_timeout(config.database_statement_timeout);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL record store");
            serve(&config, store, metrics_handle).await;
        }
        None => {
            let store = InMemoryStore::new();
            api::seed_demo_catalog(&store).await;
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo products");
            serve(&config, store, metrics_handle).await;
        }
    }

    tracing::info!("checkout API stopped");
}
