//! SQLite connection handle backed by `rusqlite`.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections on demand.
//! - Bind named parameters and collect result rows as `Record`s.
//!
//! # Invariants
//! - Opened connections have `foreign_keys=ON` and a busy timeout.
//! - Every statement parameter must be supplied; missing ones are errors,
//!   never silent NULLs.
//! - Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` on the one owned
//!   connection.

use super::{Command, Connection, Executor, Transaction};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::value::{Params, Record, Value};
use log::{error, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::Statement;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteTarget {
    File(PathBuf),
    Memory,
}

/// Unopened-until-`open` SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    target: SqliteTarget,
    busy_timeout: Duration,
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Connection to a database file; `:memory:` selects a private in-memory
    /// database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let target = if path.as_os_str() == MEMORY_PATH {
            SqliteTarget::Memory
        } else {
            SqliteTarget::File(path.to_path_buf())
        };
        Self {
            target,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            conn: None,
        }
    }

    pub fn memory() -> Self {
        Self::file(MEMORY_PATH)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Connection factory producing fresh handles for `path`.
    pub fn factory(path: &Path) -> impl Fn() -> Box<dyn Connection> + Send + Sync {
        let path = path.to_path_buf();
        move || Box::new(SqliteConnection::file(&path)) as Box<dyn Connection>
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn mode(&self) -> &'static str {
        match self.target {
            SqliteTarget::File(_) => "file",
            SqliteTarget::Memory => "memory",
        }
    }

    fn handle(&mut self) -> Result<&mut rusqlite::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::connection("sqlite connection is not open"))
    }

    fn prepare_command<'conn>(
        conn: &'conn rusqlite::Connection,
        transaction: Option<&Transaction>,
        command: &Command,
        default_timeout: Duration,
    ) -> Result<Statement<'conn>> {
        if let Some(transaction) = transaction {
            if conn.is_autocommit() {
                return Err(Error::execution(format!(
                    "transaction {} is no longer active on this connection",
                    transaction.id()
                )));
            }
        }
        conn.busy_timeout(command.timeout.unwrap_or(default_timeout))
            .map_err(Error::execution)?;
        let mut stmt = conn.prepare(&command.sql).map_err(Error::execution)?;
        bind_params(&mut stmt, &command.params)?;
        Ok(stmt)
    }
}

impl Executor for SqliteConnection {
    fn query(
        &mut self,
        transaction: Option<&Transaction>,
        command: &Command,
    ) -> Result<Vec<Record>> {
        let default_timeout = self.busy_timeout;
        let conn = self.handle()?;
        let mut stmt = Self::prepare_command(conn, transaction, command, default_timeout)?;
        let names = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(Error::execution)? {
            let mut record = Record::new();
            for (index, name) in names.iter().enumerate() {
                let value: SqlValue = row.get(index).map_err(Error::execution)?;
                record.push(name.as_str(), from_sqlite(value));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn execute(&mut self, transaction: Option<&Transaction>, command: &Command) -> Result<u64> {
        let default_timeout = self.busy_timeout;
        let conn = self.handle()?;
        let mut stmt = Self::prepare_command(conn, transaction, command, default_timeout)?;
        let changed = stmt.raw_execute().map_err(Error::execution)?;
        Ok(changed as u64)
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::SQLITE
    }

    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let started_at = Instant::now();
        let opened = match &self.target {
            SqliteTarget::File(path) => rusqlite::Connection::open(path),
            SqliteTarget::Memory => rusqlite::Connection::open_in_memory(),
        };
        let conn = opened
            .and_then(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn.busy_timeout(self.busy_timeout)?;
                Ok(conn)
            })
            .map_err(|err| {
                error!(
                    "event=db_open module=driver status=error mode={} duration_ms={} error={}",
                    self.mode(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Error::connection(err)
            })?;

        info!(
            "event=db_open module=driver status=ok mode={} duration_ms={}",
            self.mode(),
            started_at.elapsed().as_millis()
        );
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| Error::connection(err)),
            None => Ok(()),
        }
    }

    fn begin(&mut self) -> Result<Transaction> {
        self.handle()?
            .execute_batch("BEGIN;")
            .map_err(Error::connection)?;
        Ok(Transaction::new())
    }

    fn commit(&mut self, transaction: Transaction) -> Result<()> {
        let conn = self.handle()?;
        if let Err(err) = conn.execute_batch("COMMIT;") {
            if !conn.is_autocommit() {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                    error!(
                        "event=db_rollback module=driver status=error tx={} error={}",
                        transaction.id(),
                        rollback_err
                    );
                }
            }
            error!(
                "event=db_commit module=driver status=error tx={} error={}",
                transaction.id(),
                err
            );
            return Err(Error::execution(err));
        }
        Ok(())
    }

    fn rollback(&mut self, _transaction: Transaction) -> Result<()> {
        let conn = self.handle()?;
        if conn.is_autocommit() {
            // SQLite already rolled back (e.g. after a failed statement).
            return Ok(());
        }
        conn.execute_batch("ROLLBACK;").map_err(Error::execution)
    }
}

fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(name) = stmt.parameter_name(index).map(str::to_owned) else {
            return Err(Error::execution(format!(
                "positional parameter at index {index} is not supported; use @name"
            )));
        };
        let bare = name.trim_start_matches(['@', ':', '$']);
        let value = params
            .get(bare)
            .ok_or_else(|| Error::execution(format!("missing value for parameter `{name}`")))?;
        stmt.raw_bind_parameter(index, to_sqlite(value))
            .map_err(Error::execution)?;
    }
    Ok(())
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(int) => SqlValue::Integer(*int),
        Value::Real(real) => SqlValue::Real(*real),
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

fn from_sqlite(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(int) => Value::Integer(int),
        SqlValue::Real(real) => Value::Real(real),
        SqlValue::Text(text) => Value::Text(text),
        SqlValue::Blob(bytes) => Value::Blob(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteConnection;
    use crate::driver::{Command, Connection, Executor};
    use crate::error::Error;
    use crate::value::{Params, Value};

    fn open_memory() -> SqliteConnection {
        let mut conn = SqliteConnection::memory();
        conn.open().unwrap();
        conn.execute(
            None,
            &Command::new("CREATE TABLE metals (id INTEGER PRIMARY KEY, name TEXT NOT NULL);"),
        )
        .unwrap();
        conn
    }

    #[test]
    fn named_parameters_bind_with_any_prefix() {
        let mut conn = open_memory();
        let insert = Command::new("INSERT INTO metals (name) VALUES (@name), (:name), ($name);")
            .params(Params::new().bind("name", "Iron"));
        assert_eq!(conn.execute(None, &insert).unwrap(), 3);

        let rows = conn
            .query(None, &Command::new("SELECT id, name FROM metals ORDER BY id;"))
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Iron".to_string())));
    }

    #[test]
    fn missing_parameter_is_an_execution_error() {
        let mut conn = open_memory();
        let err = conn
            .execute(None, &Command::new("INSERT INTO metals (name) VALUES (@name);"))
            .unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert!(err.to_string().contains("@name"));
    }

    #[test]
    fn statements_fail_once_closed() {
        let mut conn = open_memory();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(!conn.is_open());
        let err = conn
            .query(None, &Command::new("SELECT 1;"))
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[test]
    fn rollback_discards_uncommitted_rows() {
        let mut conn = open_memory();
        let tx = conn.begin().unwrap();
        conn.execute(
            Some(&tx),
            &Command::new("INSERT INTO metals (name) VALUES ('Tin');"),
        )
        .unwrap();
        conn.rollback(tx).unwrap();

        let rows = conn
            .query(None, &Command::new("SELECT COUNT(*) AS total FROM metals;"))
            .unwrap();
        assert_eq!(rows[0].get("total"), Some(&Value::Integer(0)));
    }

    #[test]
    fn failed_commit_rolls_the_transaction_back() {
        let mut conn = open_memory();
        conn.execute(
            None,
            &Command::new(
                "CREATE TABLE alloys (id INTEGER PRIMARY KEY, metal_id INTEGER REFERENCES metals(id) DEFERRABLE INITIALLY DEFERRED);",
            ),
        )
        .unwrap();

        let tx = conn.begin().unwrap();
        conn.execute(
            Some(&tx),
            &Command::new("INSERT INTO alloys (metal_id) VALUES (99);"),
        )
        .unwrap();
        let err = conn.commit(tx).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));

        let rows = conn
            .query(None, &Command::new("SELECT COUNT(*) AS total FROM alloys;"))
            .unwrap();
        assert_eq!(rows[0].get("total"), Some(&Value::Integer(0)));
        let tx = conn.begin().unwrap();
        conn.commit(tx).unwrap();
    }

    #[test]
    fn factory_outlives_the_borrowed_path() {
        let factory = {
            let path = std::path::PathBuf::from(":memory:");
            SqliteConnection::factory(&path)
        };
        let mut conn = factory();
        conn.open().unwrap();
        let rows = conn.query(None, &Command::new("SELECT 1 AS one;")).unwrap();
        assert_eq!(rows[0].get("one"), Some(&Value::Integer(1)));
        conn.close().unwrap();
    }
}
