//! Database connection and initialization

use std::path::{Path, PathBuf};

use reviewdesk_core::Config;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;

use crate::hub::ChangeHub;
use crate::repos::{CustomerRepository, RequestRepository};
use crate::Result;

/// Connection settings for the request database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,

    /// Buffer size of the change hub and each of its subscriptions
    pub feed_buffer: usize,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 5,
            feed_buffer: 256,
        }
    }

    /// Settings taken from the application config
    pub fn from_config(config: &Config) -> reviewdesk_core::Result<Self> {
        Ok(Self::new(config.database_path()?)
            .with_max_connections(config.database.max_connections)
            .with_feed_buffer(config.sync.feed_buffer))
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_feed_buffer(mut self, feed_buffer: usize) -> Self {
        self.feed_buffer = feed_buffer;
        self
    }
}

/// Database connection pool plus the change hub fed by its writes
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    hub: ChangeHub,
}

impl Database {
    /// Create a new database connection from a file path with default settings
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&DatabaseConfig::new(db_path.as_ref())).await
    }

    /// Open or create the database and run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %config.path.display(), "Opened request database");

        Ok(Self {
            pool,
            hub: ChangeHub::new(config.feed_buffer),
        })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Change feed for writes made through this handle
    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Get the request repository
    pub fn requests(&self) -> RequestRepository {
        RequestRepository::new(self.pool.clone(), self.hub.clone())
    }

    /// Get the customer repository; sending a customer goes through [`Self::requests`]
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone(), self.requests())
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
