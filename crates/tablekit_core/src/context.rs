//! Connection contexts: sessions and units of work.
//!
//! # Responsibility
//! - Own one raw connection (and for a unit of work, one transaction) from
//!   acquisition to teardown.
//! - Hand operations the connection parts they execute against.
//!
//! # Invariants
//! - Acquisition failures release every partially acquired resource before
//!   the error propagates.
//! - Teardown runs exactly once, on `close`/`close_async` or on drop.
//! - A unit of work commits only after `mark_successful`; otherwise it rolls
//!   back.
//! - Operations on a context that left `Active` fail with
//!   `Error::ContextNotActive`.

use crate::driver::{Connection, Transaction};
use crate::error::{Error, Result};
use log::{error, info, warn};
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Lifecycle state of a connection context.
///
/// A context only exists once its connection is open (and, for a unit of
/// work, its transaction begun), so it starts out `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Active,
    Committed,
    RolledBack,
    Closed,
}

impl Display for ContextState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// How a unit of work finished its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack,
}

/// Connection and optional transaction an operation executes against.
pub struct ConnectionParts<'a> {
    pub connection: &'a mut dyn Connection,
    pub transaction: Option<&'a Transaction>,
}

/// Connection context without transaction semantics.
pub struct Session {
    database: String,
    connection: Box<dyn Connection>,
    state: ContextState,
}

impl Session {
    /// Opens `connection`; on failure the handle is released first.
    pub fn open(database: impl Into<String>, mut connection: Box<dyn Connection>) -> Result<Self> {
        let database = database.into();
        let started_at = Instant::now();
        if let Err(err) = connection.open() {
            log_open_failure("session_open", &database, started_at, &err);
            release(connection.as_mut(), &database);
            return Err(err);
        }
        Ok(Self::activated(database, connection, started_at))
    }

    pub async fn open_async(
        database: impl Into<String>,
        mut connection: Box<dyn Connection>,
    ) -> Result<Self> {
        let database = database.into();
        let started_at = Instant::now();
        if let Err(err) = connection.open_async().await {
            log_open_failure("session_open", &database, started_at, &err);
            release_async(connection.as_mut(), &database).await;
            return Err(err);
        }
        Ok(Self::activated(database, connection, started_at))
    }

    fn activated(database: String, connection: Box<dyn Connection>, started_at: Instant) -> Self {
        info!(
            "event=session_open module=context status=ok database={} duration_ms={}",
            database,
            started_at.elapsed().as_millis()
        );
        Self {
            database,
            connection,
            state: ContextState::Active,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn parts(&mut self) -> Result<ConnectionParts<'_>> {
        if self.state != ContextState::Active {
            return Err(Error::ContextNotActive(self.state));
        }
        Ok(ConnectionParts {
            connection: self.connection.as_mut(),
            transaction: None,
        })
    }

    /// Closes and releases the connection. Subsequent calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.state != ContextState::Active {
            return Ok(());
        }
        self.state = ContextState::Closed;
        let closed = self.connection.close();
        log_close("session_close", &self.database, None, &closed);
        closed
    }

    pub async fn close_async(&mut self) -> Result<()> {
        if self.state != ContextState::Active {
            return Ok(());
        }
        self.state = ContextState::Closed;
        let closed = self.connection.close_async().await;
        log_close("session_close", &self.database, None, &closed);
        closed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Errors are already logged by `close`.
        let _ = self.close();
    }
}

/// Transaction-scoped connection context.
pub struct UnitOfWork {
    database: String,
    connection: Box<dyn Connection>,
    transaction: Option<Transaction>,
    success: bool,
    state: ContextState,
    outcome: Option<Outcome>,
}

impl UnitOfWork {
    /// Opens `connection` and begins a transaction as one step.
    ///
    /// If either part fails the connection is closed before the error
    /// propagates.
    pub fn begin(database: impl Into<String>, mut connection: Box<dyn Connection>) -> Result<Self> {
        let database = database.into();
        let started_at = Instant::now();
        let begun = connection.open().and_then(|()| connection.begin());
        match begun {
            Ok(transaction) => Ok(Self::activated(database, connection, transaction, started_at)),
            Err(err) => {
                log_open_failure("uow_begin", &database, started_at, &err);
                release(connection.as_mut(), &database);
                Err(err)
            }
        }
    }

    pub async fn begin_async(
        database: impl Into<String>,
        mut connection: Box<dyn Connection>,
    ) -> Result<Self> {
        let database = database.into();
        let started_at = Instant::now();
        let begun = match connection.open_async().await {
            Ok(()) => connection.begin_async().await,
            Err(err) => Err(err),
        };
        match begun {
            Ok(transaction) => Ok(Self::activated(database, connection, transaction, started_at)),
            Err(err) => {
                log_open_failure("uow_begin", &database, started_at, &err);
                release_async(connection.as_mut(), &database).await;
                Err(err)
            }
        }
    }

    fn activated(
        database: String,
        connection: Box<dyn Connection>,
        transaction: Transaction,
        started_at: Instant,
    ) -> Self {
        info!(
            "event=uow_begin module=context status=ok database={} tx={} duration_ms={}",
            database,
            transaction.id(),
            started_at.elapsed().as_millis()
        );
        Self {
            database,
            connection,
            transaction: Some(transaction),
            success: false,
            state: ContextState::Active,
            outcome: None,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// How the transaction finished; `None` while active.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Requests commit at teardown.
    pub fn mark_successful(&mut self) {
        self.success = true;
    }

    pub fn set_successful(&mut self, success: bool) {
        self.success = success;
    }

    pub fn is_successful(&self) -> bool {
        self.success
    }

    pub fn parts(&mut self) -> Result<ConnectionParts<'_>> {
        match (&self.state, self.transaction.as_ref()) {
            (ContextState::Active, Some(transaction)) => Ok(ConnectionParts {
                connection: self.connection.as_mut(),
                transaction: Some(transaction),
            }),
            (state, _) => Err(Error::ContextNotActive(*state)),
        }
    }

    /// Commits or rolls back per the success flag, then closes the
    /// connection. Subsequent calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        let Some(transaction) = self.begin_teardown() else {
            return Ok(());
        };
        let finished = if self.success {
            self.connection.commit(transaction)
        } else {
            self.connection.rollback(transaction)
        };
        self.record_finish(&finished);
        let closed = self.connection.close();
        self.finish_teardown(finished, closed)
    }

    pub async fn close_async(&mut self) -> Result<()> {
        let Some(transaction) = self.begin_teardown() else {
            return Ok(());
        };
        let finished = if self.success {
            self.connection.commit_async(transaction).await
        } else {
            self.connection.rollback_async(transaction).await
        };
        self.record_finish(&finished);
        let closed = self.connection.close_async().await;
        self.finish_teardown(finished, closed)
    }

    fn begin_teardown(&mut self) -> Option<Transaction> {
        if self.state != ContextState::Active {
            return None;
        }
        self.transaction.take()
    }

    fn record_finish(&mut self, finished: &Result<()>) {
        let (event, outcome) = if self.success {
            ("uow_commit", Outcome::Committed)
        } else {
            ("uow_rollback", Outcome::RolledBack)
        };
        match finished {
            Ok(()) => {
                self.state = match outcome {
                    Outcome::Committed => ContextState::Committed,
                    Outcome::RolledBack => ContextState::RolledBack,
                };
                self.outcome = Some(outcome);
                info!(
                    "event={} module=context status=ok database={}",
                    event, self.database
                );
            }
            Err(err) => error!(
                "event={} module=context status=error database={} error={}",
                event, self.database, err
            ),
        }
    }

    fn finish_teardown(&mut self, finished: Result<()>, closed: Result<()>) -> Result<()> {
        self.state = ContextState::Closed;
        log_close("uow_close", &self.database, self.outcome, &closed);
        finished?;
        closed
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state == ContextState::Active && !self.success {
            warn!(
                "event=uow_drop module=context status=ok database={} action=rollback",
                self.database
            );
        }
        // Errors are already logged by `close`.
        let _ = self.close();
    }
}

/// A session or a unit of work, as handed out by the storage manager.
pub enum ConnectionContext {
    Session(Session),
    UnitOfWork(UnitOfWork),
}

impl ConnectionContext {
    pub fn database(&self) -> &str {
        match self {
            Self::Session(session) => session.database(),
            Self::UnitOfWork(unit) => unit.database(),
        }
    }

    pub fn state(&self) -> ContextState {
        match self {
            Self::Session(session) => session.state(),
            Self::UnitOfWork(unit) => unit.state(),
        }
    }

    pub fn is_unit_of_work(&self) -> bool {
        matches!(self, Self::UnitOfWork(_))
    }

    /// Requests commit at teardown; sessions have nothing to commit.
    pub fn mark_successful(&mut self) {
        if let Self::UnitOfWork(unit) = self {
            unit.mark_successful();
        }
    }

    pub fn set_successful(&mut self, success: bool) {
        if let Self::UnitOfWork(unit) = self {
            unit.set_successful(success);
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Session(_) => None,
            Self::UnitOfWork(unit) => unit.outcome(),
        }
    }

    pub fn parts(&mut self) -> Result<ConnectionParts<'_>> {
        match self {
            Self::Session(session) => session.parts(),
            Self::UnitOfWork(unit) => unit.parts(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Self::Session(session) => session.close(),
            Self::UnitOfWork(unit) => unit.close(),
        }
    }

    pub async fn close_async(&mut self) -> Result<()> {
        match self {
            Self::Session(session) => session.close_async().await,
            Self::UnitOfWork(unit) => unit.close_async().await,
        }
    }
}

impl From<Session> for ConnectionContext {
    fn from(value: Session) -> Self {
        Self::Session(value)
    }
}

impl From<UnitOfWork> for ConnectionContext {
    fn from(value: UnitOfWork) -> Self {
        Self::UnitOfWork(value)
    }
}

fn release(connection: &mut dyn Connection, database: &str) {
    if let Err(err) = connection.close() {
        error!(
            "event=connection_release module=context status=error database={} error={}",
            database, err
        );
    }
}

async fn release_async(connection: &mut dyn Connection, database: &str) {
    if let Err(err) = connection.close_async().await {
        error!(
            "event=connection_release module=context status=error database={} error={}",
            database, err
        );
    }
}

fn log_open_failure(event: &str, database: &str, started_at: Instant, err: &Error) {
    error!(
        "event={} module=context status=error database={} duration_ms={} error={}",
        event,
        database,
        started_at.elapsed().as_millis(),
        err
    );
}

fn log_close(event: &str, database: &str, outcome: Option<Outcome>, closed: &Result<()>) {
    let outcome = match outcome {
        Some(Outcome::Committed) => "committed",
        Some(Outcome::RolledBack) => "rolled_back",
        None => "none",
    };
    match closed {
        Ok(()) => info!(
            "event={} module=context status=ok database={} outcome={}",
            event, database, outcome
        ),
        Err(err) => error!(
            "event={} module=context status=error database={} outcome={} error={}",
            event, database, outcome, err
        ),
    }
}
