// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;

/// Billflow API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Environment name used to namespace task queues (read once at startup)
    pub env_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `BILLFLOW_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `BILLFLOW_HTTP_PORT`: HTTP listen port (default: 8080)
    /// - `BILLFLOW_ENV`: environment name prefix for task queues (default: empty)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("BILLFLOW_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("BILLFLOW_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("BILLFLOW_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("BILLFLOW_HTTP_PORT", "must be a valid port number")
            })?;

        let env_name = std::env::var("BILLFLOW_ENV").unwrap_or_default();

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            env_name,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
