//! Grocera API server

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grocera::config::Config;
use grocera::http::{router, AppState};
use grocera::repository::{MemoryRepository, PgRepository, Repository};
use grocera::services::{AuthService, EventPublisher, PaymentGateway, SslCommerzGateway, UnconfiguredGateway};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    let repo: Arc<dyn Repository> = match &config.database_url {
        Some(url) => {
            let pg = PgRepository::connect(url.expose_secret()).await.context("connecting to PostgreSQL")?;
            pg.migrate().await.context("running migrations")?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryRepository::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        Some(gateway) => Arc::new(SslCommerzGateway::new(gateway)?),
        None => {
            tracing::warn!("payment gateway credentials missing, deposits are disabled");
            Arc::new(UnconfiguredGateway)
        }
    };

    let addr = config.socket_addr();
    let state = AppState {
        repo,
        auth: AuthService::new(&config.jwt_secret, config.jwt_ttl_hours, config.bcrypt_cost),
        gateway,
        events: EventPublisher::new(nats),
        config: Arc::new(config),
    };

    tracing::info!("Grocera listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state)).await?;
    Ok(())
}
