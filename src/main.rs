use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use portfolio_api::configuration::get_configuration;
use portfolio_api::startup::run;
use portfolio_api::store::PgStore;
use portfolio_api::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;
    tracing::info!("Database connection pool created successfully");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let store = Arc::new(PgStore::new(pool));
    let server = run(listener, store, configuration)?;
    server.await
}
