//! Typed data access over relational databases.
//!
//! Entities declare their table shape once; repositories derive CRUD
//! statements from cached metadata and run them through connection
//! contexts handed out by the storage manager.

pub mod cache;
pub mod context;
pub mod dialect;
pub mod driver;
pub mod engine;
pub mod error;
pub mod logging;
pub mod query;
pub mod repo;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod value;

pub use cache::{ColumnMetadata, EntityMetadata, MetadataCache};
pub use context::{ConnectionContext, ConnectionParts, ContextState, Outcome, Session, UnitOfWork};
pub use dialect::Dialect;
pub use driver::sqlite::SqliteConnection;
pub use driver::{Command, Connection, ConnectionFactory, Executor, Transaction};
pub use engine::UnexpectedRowCount;
pub use error::{BoxError, ConfigError, Error, Result};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use repo::Repository;
pub use schema::{Entity, EntitySchema, FieldKind, FieldSchema, KeyKind};
pub use settings::{DatabaseSettings, LoggingSettings, StorageSettings};
pub use storage::{DatabaseRegistration, StorageConfig, StorageManager, DEFAULT_DATABASE};
pub use value::{Params, Record, Value};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
