pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{redis::RedisHandle, state::AppState, telemetry};
use crate::services::recognition::VisionRecognitionService;
use crate::services::run_lease::RedisRunLease;
use crate::store::{GradingStore, MemoryStore, PgStore};

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn GradingStore>> {
    match settings.database().backend {
        StoreBackend::Postgres => {
            let db_pool = db::init_pool(settings).await?;
            db::run_migrations(&db_pool).await?;
            Ok(Arc::new(PgStore::new(db_pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let store = build_store(&settings).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::warn!(error = %err, "Failed to connect to Redis; analysis leases stay in-process");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let lease = RedisRunLease::new(
        redis.clone(),
        Duration::from_secs(settings.analysis().lease_ttl_seconds),
    );
    let recognizer = VisionRecognitionService::from_settings(settings.recognition())?;
    let state =
        AppState::new(settings, store, Arc::new(recognizer), Arc::new(lease), redis.clone());

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        backend = ?state.settings().database().backend,
        "Markscan API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
