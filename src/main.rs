//! OpenSASE Shop - Self-hosted storefront service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_shop::auth::JwtIdentityResolver;
use opensase_shop::config::{AppConfig, LogFormat};
use opensase_shop::http::{router, AppState};
use opensase_shop::publisher::EventPublisher;
use opensase_shop::services::Services;
use opensase_shop::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init(),
    }
    tracing::debug!(?config, "configuration loaded");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.database_max_connections).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
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

    let services = Services::new(store, EventPublisher::new(nats), config.status_policy);
    let state = AppState { services, identity: Arc::new(JwtIdentityResolver::new(&config.jwt_secret)) };
    let app = router(state);

    let addr = config.socket_addr();
    tracing::info!("🚀 OpenSASE Shop listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
