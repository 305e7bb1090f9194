use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use common::database::{self, DatabaseConfig};
use identity::roles::RoleRegistry;
use identity::settings::{Settings, StorageBackend};
use identity::store::{IdentityStore, MemoryStore, PgStore};
use identity::{AppState, create_router, seed};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    common::telemetry::init_tracing(&settings.log.level)
        .context("Failed to initialise tracing")?;

    info!("Starting identity service");

    let store: Arc<dyn IdentityStore> = match settings.storage.backend {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = database::init_pool(&db_config).await?;
            if !database::health_check(&pool).await? {
                anyhow::bail!("Failed to connect to database");
            }
            let store = PgStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = store.backend_name(), "Storage ready");

    let registry = Arc::new(RoleRegistry::standard());
    if settings.seed.enabled {
        seed::run(store.as_ref(), &registry, &settings.seed.email_domain).await?;
    }

    let state = AppState::new(store, registry)
        .with_uniform_login_errors(settings.auth.uniform_login_errors);
    let app = create_router(state);

    let addr = settings.server.addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Identity service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Identity service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
