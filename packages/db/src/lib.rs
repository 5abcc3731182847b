//! Storage for the job dispatch engine.
//!
//! This crate provides the SurrealDB connection, the repositories used by
//! the status store and the persist handler, and the [`StatusStore`]
//! abstraction with its SurrealDB and Redis backends.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;
pub mod store;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;
pub use store::{RedisStatusStore, StatusStore, StoreError, StoreFuture, SurrealStatusStore};

/// Connect to the database and make sure the schema exists.
///
/// Waits for the database to become reachable; see [`connect`].
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
