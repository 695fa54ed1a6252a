//! Praetor admin rbac API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use praetor_core::AppError;
use tracing::info;

use crate::api_config::{ApiConfig, StoreConfig};
use crate::api_services::{RepositorySet, build_app_state, connect, run_migrations};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = ApiConfig::load()?;

    let repositories = match &config.store {
        StoreConfig::Postgres { database_url } => {
            let pool = connect(database_url).await?;
            run_migrations(&pool).await?;
            if config.migrate_only {
                return Ok(());
            }
            RepositorySet::postgres(&pool)
        }
        StoreConfig::Memory => {
            tracing::warn!("using in-memory store; state is lost on restart");
            RepositorySet::in_memory()
        }
    };

    let app_state = build_app_state(repositories, &config)?;
    let super_admin = app_state.role_hierarchy_service.seed_system_roles().await?;
    info!(role_id = %super_admin.id, "system roles seeded");

    let app = api_router::build_router(app_state);
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "praetor-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
