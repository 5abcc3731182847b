//! Database connection management with startup retry.

use std::time::Duration;

use job_core::retry::{DEFAULT_RETRY_INTERVAL, wait_for};
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;
use thiserror::Error;

/// Database connection handle. Cloning shares the underlying connection.
pub type Database = Surreal<Any>;

/// Endpoint schemes the `any` engine was built with.
///
/// Any other scheme can never connect, so it is rejected up front instead
/// of being retried.
fn supported_schemes() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut schemes = vec!["mem", "memory"];
    #[cfg(feature = "rocksdb")]
    schemes.push("rocksdb");
    schemes
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection endpoint: "mem://", or "rocksdb://path" with the rocksdb feature
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
    /// Pause between connection attempts while the database is unreachable.
    pub retry_interval: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "dispatch".to_string(),
            database: "main".to_string(),
            credentials: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for an arbitrary endpoint.
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self::endpoint(format!("rocksdb://{}", path.into()))
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Set the pause between connection attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn validate(&self) -> Result<(), DbError> {
        let scheme = self
            .endpoint
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| DbError::InvalidEndpoint(self.endpoint.clone()))?;
        if supported_schemes().contains(&scheme) {
            Ok(())
        } else {
            Err(DbError::InvalidEndpoint(self.endpoint.clone()))
        }
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid database endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Open the database connection.
///
/// An endpoint that cannot be parsed fails immediately. Otherwise the
/// connection is retried every `retry_interval` until the database answers.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    config.validate()?;

    let db = wait_for("database", config.retry_interval, || open(config)).await;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );
    Ok(db)
}

async fn open(config: &DbConfig) -> Result<Database, surrealdb::Error> {
    tracing::debug!("Connecting to database: {}", config.endpoint);

    let db = connect_any(config.endpoint.as_str()).await?;

    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(&config.namespace).use_db(&config.database).await?;

    Ok(db)
}
