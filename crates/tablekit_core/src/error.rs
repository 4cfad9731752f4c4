//! Error taxonomy shared by every tablekit component.
//!
//! # Responsibility
//! - Separate misuse (`Configuration`) from I/O failures (`Connection`,
//!   `Execution`) so callers can tell fatal setup problems from database
//!   problems.
//! - Carry driver errors opaquely so any back end can plug in.
//!
//! # Invariants
//! - Configuration errors name the offending entity type, database or
//!   component.
//! - Driver errors keep their `source()` chain.

use crate::context::ContextState;
use std::error::Error as StdError;
use thiserror::Error;

/// Opaque driver error carried by `Connection` and `Execution` failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error for storage, context and repository operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Misuse detected eagerly; never retried.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// Opening a connection or beginning a transaction failed.
    #[error("connection failed: {source}")]
    Connection {
        #[source]
        source: BoxError,
    },
    /// The execution engine reported a failure while running a statement.
    #[error("statement execution failed: {source}")]
    Execution {
        #[source]
        source: BoxError,
    },
    /// A row or entity could not be converted between SQL values and fields.
    #[error("row mapping failed: {0}")]
    Mapping(String),
    /// An operation was invoked on a context that already left `Active`.
    #[error("connection context is {0}; operations require an active context")]
    ContextNotActive(ContextState),
}

impl Error {
    pub fn connection<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Connection { source: err.into() }
    }

    pub fn execution<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Execution { source: err.into() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Mapping(value.to_string())
    }
}

/// Misconfiguration of entities, databases, dialects or components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("table name is not declared on entity `{entity}`")]
    MissingTableName { entity: &'static str },
    #[error("no columns found on entity `{entity}`")]
    NoColumns { entity: &'static str },
    #[error("no key column declared on entity `{entity}`")]
    MissingKey { entity: &'static str },
    #[error("entity `{entity}` declares more than one key column: {columns}")]
    MultipleKeys {
        entity: &'static str,
        columns: String,
    },
    #[error("no SQL dialect selected; select one before building entity metadata")]
    DialectNotSelected,
    #[error("SQL dialect already selected as `{selected}`; refusing to switch to `{requested}`")]
    DialectConflict {
        selected: &'static str,
        requested: &'static str,
    },
    #[error("unknown SQL driver `{0}`")]
    UnknownDriver(String),
    #[error("database `{0}` is registered more than once")]
    DuplicateDatabase(String),
    #[error("database `{0}` is not registered")]
    UnknownDatabase(String),
    #[error("no databases registered")]
    NoDatabases,
    #[error("component `{0}` is registered more than once")]
    DuplicateComponent(&'static str),
    #[error("no repository registered for `{0}`")]
    UnregisteredRepository(&'static str),
    #[error("no query registered for `{0}`")]
    UnregisteredQuery(&'static str),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
