use iot_forecast::cache::PredictionCache;
use iot_forecast::config::Config;
use iot_forecast::db::Repository;
use iot_forecast::forecaster::{self, Forecaster};
use iot_forecast::routes::{self, AppState};
use iot_forecast::service::PredictionService;
use iot_forecast::store::{HistoryWindow, StationStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,iot_forecast=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("IoT forecast service starting...");

    let config_path =
        std::env::var("IOT_FORECAST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. The config file exists (or set IOT_FORECAST_CONFIG)\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            config_path,
            e
        )
    })?;
    info!("Configuration loaded from {}", config_path);

    // Connections are opened on demand so a database outage surfaces as a
    // per-request error instead of keeping the service down
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_seconds))
        .connect_lazy_with(config.database.connect_options());

    info!(
        "Database pool ready for {}@{}:{}/{}",
        config.database.user, config.database.host, config.database.port, config.database.name
    );

    let repository = Arc::new(Repository::new(pool));
    if config.database.run_migrations {
        repository.run_migrations().await?;
    }

    let forecaster = forecaster::from_config(&config.forecaster)?;
    info!(
        "Forecaster: {} (timeout {}s)",
        forecaster.describe(),
        config.forecaster.timeout().as_secs()
    );

    let cache = PredictionCache::new(&config.cache.directory, config.cache.freshness());
    info!(
        "Caching forecasts in {} for {}s",
        cache.directory().display(),
        cache.freshness().as_secs()
    );

    let store: Arc<dyn StationStore> = repository;
    let predictions = PredictionService::new(
        store.clone(),
        forecaster,
        cache,
        HistoryWindow::from(&config.history),
    );
    let app = routes::router(AppState { predictions, store });

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("IoT forecast service shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
