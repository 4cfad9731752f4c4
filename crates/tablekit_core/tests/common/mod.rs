#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tablekit_core::{
    query, Command, Connection, Dialect, Entity, EntitySchema, Error, Executor, FieldSchema,
    Record, Result, SqliteConnection, StorageConfig, StorageManager, Transaction,
};

pub const ELEMENTS_DDL: &str = "CREATE TABLE IF NOT EXISTS elements (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL,
    Symbol TEXT NOT NULL
);";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: i64,
    pub name: String,
    pub symbol: String,
}

impl Element {
    pub fn new(name: &str, symbol: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

impl Entity for Element {
    fn schema() -> EntitySchema {
        EntitySchema::table("elements")
            .with(FieldSchema::new("id").column("Id").key())
            .column("name", "Name")
            .column("symbol", "Symbol")
    }
}

/// Default database backed by `elements.db` in `dir`, schema applied.
pub fn sqlite_config(dir: &Path) -> StorageConfig {
    let path = dir.join("elements.db");
    let mut conn = SqliteConnection::file(&path);
    conn.open().unwrap();
    conn.execute(None, &Command::new(ELEMENTS_DDL)).unwrap();
    conn.close().unwrap();

    let mut config = StorageConfig::new();
    config
        .add_default_database(SqliteConnection::factory(&path))
        .unwrap();
    config
}

pub fn sqlite_manager(dir: &Path) -> StorageManager {
    StorageManager::new(sqlite_config(dir)).unwrap()
}

pub fn count_elements(manager: &StorageManager) -> i64 {
    let mut session = manager.start_session(None).unwrap();
    let total = query::read_scalar::<i64>(
        &mut session,
        &Command::new("SELECT COUNT(*) FROM elements;"),
    )
    .unwrap()
    .unwrap();
    session.close().unwrap();
    total
}

/// Lifecycle calls observed by scripted connections, shared across clones.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| **seen == event)
            .count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionScript {
    pub fail_open: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_execute: bool,
    pub dialect: Option<Dialect>,
    pub rows: Vec<Record>,
}

/// Connection that records lifecycle calls and fails on demand.
pub struct ScriptedConnection {
    log: EventLog,
    script: ConnectionScript,
}

pub fn scripted_factory(
    log: &EventLog,
    script: ConnectionScript,
) -> impl Fn() -> Box<dyn Connection> + Send + Sync {
    let log = log.clone();
    move || {
        Box::new(ScriptedConnection {
            log: log.clone(),
            script: script.clone(),
        }) as Box<dyn Connection>
    }
}

impl Executor for ScriptedConnection {
    fn query(
        &mut self,
        _transaction: Option<&Transaction>,
        _command: &Command,
    ) -> Result<Vec<Record>> {
        self.log.push("query");
        Ok(self.script.rows.clone())
    }

    fn execute(&mut self, _transaction: Option<&Transaction>, _command: &Command) -> Result<u64> {
        self.log.push("execute");
        if self.script.fail_execute {
            return Err(Error::execution("scripted execute failure"));
        }
        Ok(1)
    }
}

impl Connection for ScriptedConnection {
    fn dialect(&self) -> Dialect {
        self.script.dialect.unwrap_or(Dialect::SQLITE)
    }

    fn open(&mut self) -> Result<()> {
        self.log.push("open");
        if self.script.fail_open {
            return Err(Error::connection("scripted open failure"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.push("close");
        Ok(())
    }

    fn begin(&mut self) -> Result<Transaction> {
        self.log.push("begin");
        if self.script.fail_begin {
            return Err(Error::connection("scripted begin failure"));
        }
        Ok(Transaction::new())
    }

    fn commit(&mut self, _transaction: Transaction) -> Result<()> {
        self.log.push("commit");
        if self.script.fail_commit {
            return Err(Error::execution("scripted commit failure"));
        }
        Ok(())
    }

    fn rollback(&mut self, _transaction: Transaction) -> Result<()> {
        self.log.push("rollback");
        Ok(())
    }
}

/// Manager with one scripted default database.
pub fn scripted_manager(log: &EventLog, script: ConnectionScript) -> StorageManager {
    let mut config = StorageConfig::new();
    config
        .add_default_database(scripted_factory(log, script))
        .unwrap();
    StorageManager::new(config).unwrap()
}
