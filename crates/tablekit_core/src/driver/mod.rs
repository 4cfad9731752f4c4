//! Boundary to the SQL execution engine and its connections.
//!
//! # Responsibility
//! - Describe what a raw connection must offer: lifecycle, transactions and
//!   statement execution, each blocking with a suspending counterpart.
//! - Keep drivers swappable; core code only sees these traits.
//!
//! # Invariants
//! - A connection is owned by exactly one context and never shared.
//! - `commit`/`rollback` consume the `Transaction`, so a transaction is
//!   finalized at most once.
//! - Suspending methods default to their blocking counterparts; drivers with
//!   native async I/O override them.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::value::{Params, Record};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

pub mod sqlite;

/// Handle of one open transaction on a connection.
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
}

impl Transaction {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// One statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub sql: String,
    pub params: Params,
    /// Passed through to the engine unmodified.
    pub timeout: Option<Duration>,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
            timeout: None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Statement execution: parameter binding and row retrieval.
#[async_trait]
pub trait Executor: Send {
    /// Runs a row-returning statement and collects every row.
    fn query(&mut self, transaction: Option<&Transaction>, command: &Command)
        -> Result<Vec<Record>>;

    /// Runs a statement and returns the affected-row count.
    fn execute(&mut self, transaction: Option<&Transaction>, command: &Command) -> Result<u64>;

    async fn query_async(
        &mut self,
        transaction: Option<&Transaction>,
        command: &Command,
    ) -> Result<Vec<Record>> {
        self.query(transaction, command)
    }

    async fn execute_async(
        &mut self,
        transaction: Option<&Transaction>,
        command: &Command,
    ) -> Result<u64> {
        self.execute(transaction, command)
    }
}

/// Raw database connection handle produced by a connection factory.
#[async_trait]
pub trait Connection: Executor {
    /// Dialect of the driver behind this handle.
    fn dialect(&self) -> Dialect;

    fn open(&mut self) -> Result<()>;

    /// Closes and releases the handle. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    fn begin(&mut self) -> Result<Transaction>;

    fn commit(&mut self, transaction: Transaction) -> Result<()>;

    fn rollback(&mut self, transaction: Transaction) -> Result<()>;

    async fn open_async(&mut self) -> Result<()> {
        self.open()
    }

    async fn close_async(&mut self) -> Result<()> {
        self.close()
    }

    async fn begin_async(&mut self) -> Result<Transaction> {
        self.begin()
    }

    async fn commit_async(&mut self, transaction: Transaction) -> Result<()> {
        self.commit(transaction)
    }

    async fn rollback_async(&mut self, transaction: Transaction) -> Result<()> {
        self.rollback(transaction)
    }
}

/// Zero-argument producer of fresh, unopened connections.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self) -> Box<dyn Connection>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Box<dyn Connection> + Send + Sync,
{
    fn create(&self) -> Box<dyn Connection> {
        self()
    }
}
