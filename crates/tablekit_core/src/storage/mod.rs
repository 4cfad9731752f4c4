//! Storage manager: database routing and component lookup.
//!
//! # Responsibility
//! - Resolve logical database names to connection factories.
//! - Construct and acquire sessions and units of work.
//! - Hand out registered repository and query components.
//!
//! # Invariants
//! - Database names are unique case-insensitively; duplicates are rejected
//!   at registration time.
//! - Unknown names and unregistered components fail at the call site.
//! - Every acquisition creates a fresh connection; nothing is pooled here.

mod registry;

pub use registry::{ComponentKind, ComponentRegistry};

use crate::cache::MetadataCache;
use crate::context::{ConnectionContext, Session, UnitOfWork};
use crate::dialect::Dialect;
use crate::driver::{Connection, ConnectionFactory};
use crate::error::{ConfigError, Result};
use crate::repo::Repository;
use crate::schema::Entity;
use log::info;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Name given to a registration without an explicit name.
pub const DEFAULT_DATABASE: &str = "Default";

/// One logical database and the factory producing its connections.
#[derive(Clone)]
pub struct DatabaseRegistration {
    name: String,
    factory: Arc<dyn ConnectionFactory>,
}

impl DatabaseRegistration {
    pub fn new(name: impl Into<String>, factory: impl ConnectionFactory + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn connect(&self) -> Box<dyn Connection> {
        self.factory.create()
    }
}

impl Debug for DatabaseRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Everything a `StorageManager` is built from.
pub struct StorageConfig {
    databases: Vec<DatabaseRegistration>,
    command_timeout: Option<Duration>,
    repositories: ComponentRegistry,
    queries: ComponentRegistry,
    cache: Arc<MetadataCache>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self {
            databases: Vec::new(),
            command_timeout: None,
            repositories: ComponentRegistry::new(ComponentKind::Repository),
            queries: ComponentRegistry::new(ComponentKind::Query),
            cache: Arc::new(MetadataCache::new()),
        }
    }

    /// Registers a named database.
    pub fn add_database(
        &mut self,
        name: impl Into<String>,
        factory: impl ConnectionFactory + 'static,
    ) -> Result<()> {
        let registration = DatabaseRegistration::new(name, factory);
        if self
            .databases
            .iter()
            .any(|existing| existing.matches(registration.name()))
        {
            return Err(ConfigError::DuplicateDatabase(registration.name).into());
        }
        self.databases.push(registration);
        Ok(())
    }

    /// Registers the unnamed (default) database.
    pub fn add_default_database(
        &mut self,
        factory: impl ConnectionFactory + 'static,
    ) -> Result<()> {
        self.add_database(DEFAULT_DATABASE, factory)
    }

    /// Fixes the dialect up front instead of taking it from the first
    /// connection.
    pub fn dialect(&mut self, dialect: Dialect) -> Result<()> {
        self.cache.select_dialect(dialect)
    }

    /// Timeout handed to the engine for every repository statement.
    pub fn command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Shared metadata cache, for building components before registration.
    pub fn cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    /// Repository for `T` bound to this configuration's cache and timeout.
    pub fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(self.cache()).with_command_timeout(self.command_timeout)
    }

    pub fn register_repository<R>(&mut self, repository: Arc<R>) -> Result<()>
    where
        R: ?Sized + Send + Sync + 'static,
    {
        self.repositories.register(repository)
    }

    pub fn register_query<Q>(&mut self, query: Arc<Q>) -> Result<()>
    where
        Q: ?Sized + Send + Sync + 'static,
    {
        self.queries.register(query)
    }
}

/// Entry point handing out connection contexts and components.
pub struct StorageManager {
    databases: Vec<DatabaseRegistration>,
    command_timeout: Option<Duration>,
    repositories: ComponentRegistry,
    queries: ComponentRegistry,
    cache: Arc<MetadataCache>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Result<Self> {
        if config.databases.is_empty() {
            return Err(ConfigError::NoDatabases.into());
        }
        info!(
            "event=storage_init module=storage status=ok databases={} repositories={} queries={}",
            config.databases.len(),
            config.repositories.len(),
            config.queries.len()
        );
        Ok(Self {
            databases: config.databases,
            command_timeout: config.command_timeout,
            repositories: config.repositories,
            queries: config.queries,
            cache: config.cache,
        })
    }

    /// Opens a session on `database`, or on the default database for
    /// `None` or an empty name.
    pub fn start_session(&self, database: Option<&str>) -> Result<ConnectionContext> {
        let (name, connection) = self.connect(database)?;
        Session::open(name, connection).map(ConnectionContext::from)
    }

    pub async fn start_session_async(&self, database: Option<&str>) -> Result<ConnectionContext> {
        let (name, connection) = self.connect(database)?;
        Session::open_async(name, connection)
            .await
            .map(ConnectionContext::from)
    }

    /// Opens a connection on `database` and begins a transaction. The
    /// transaction rolls back at teardown unless marked successful.
    pub fn start_unit_of_work(&self, database: Option<&str>) -> Result<ConnectionContext> {
        let (name, connection) = self.connect(database)?;
        UnitOfWork::begin(name, connection).map(ConnectionContext::from)
    }

    pub async fn start_unit_of_work_async(
        &self,
        database: Option<&str>,
    ) -> Result<ConnectionContext> {
        let (name, connection) = self.connect(database)?;
        UnitOfWork::begin_async(name, connection)
            .await
            .map(ConnectionContext::from)
    }

    pub fn get_repository<R>(&self) -> Result<Arc<R>>
    where
        R: ?Sized + Send + Sync + 'static,
    {
        self.repositories.resolve::<R>()
    }

    pub fn get_query<Q>(&self) -> Result<Arc<Q>>
    where
        Q: ?Sized + Send + Sync + 'static,
    {
        self.queries.resolve::<Q>()
    }

    /// Generic repository for `T`, without registration.
    pub fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.cache)).with_command_timeout(self.command_timeout)
    }

    pub fn cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    /// Registered names in registration order.
    pub fn database_names(&self) -> Vec<&str> {
        self.databases.iter().map(DatabaseRegistration::name).collect()
    }

    /// Name of the database `None` resolves to.
    pub fn default_database(&self) -> Option<&str> {
        self.default_registration().map(DatabaseRegistration::name)
    }

    fn default_registration(&self) -> Option<&DatabaseRegistration> {
        self.databases
            .iter()
            .find(|registration| registration.matches(DEFAULT_DATABASE))
            .or_else(|| self.databases.first())
    }

    fn resolve(&self, database: Option<&str>) -> Result<&DatabaseRegistration> {
        let requested = database.map(str::trim).filter(|name| !name.is_empty());
        let found = match requested {
            None => self.default_registration(),
            Some(name) => self
                .databases
                .iter()
                .find(|registration| registration.matches(name)),
        };
        found.ok_or_else(|| {
            ConfigError::UnknownDatabase(requested.unwrap_or(DEFAULT_DATABASE).to_string()).into()
        })
    }

    /// Fresh connection for `database`, with the dialect settled before any
    /// metadata can be built for it.
    fn connect(&self, database: Option<&str>) -> Result<(String, Box<dyn Connection>)> {
        let registration = self.resolve(database)?;
        let connection = registration.connect();
        self.cache.select_dialect(connection.dialect())?;
        Ok((registration.name().to_string(), connection))
    }
}
