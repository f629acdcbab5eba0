// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Billflow API - service entrypoint.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use billflow_api::config::Config;
use billflow_api::{router, AppState};
use billflow_core::store::{BillStore, PostgresBillStore, SqliteBillStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("billflow_api=info".parse()?)
                .add_directive("billflow_core=info".parse()?),
        )
        .init();

    info!("Starting Billflow API");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        env_name = %config.env_name,
        "Configuration loaded"
    );

    // Connect to the database and run migrations
    info!("Connecting to database...");
    let store: Arc<dyn BillStore> = if config.database_url.starts_with("postgres") {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        let store = PostgresBillStore::new(pool);
        info!("Running database migrations...");
        store.migrate().await?;
        Arc::new(store)
    } else {
        let path = config
            .database_url
            .trim_start_matches("sqlite:")
            .to_string();
        Arc::new(SqliteBillStore::from_path(path).await?)
    };
    info!("Database connection established");

    let state = AppState::new(store, &config.env_name);
    let app = router(state);

    info!(addr = %config.http_addr, "Billflow API listening");
    axum::Server::bind(&config.http_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
