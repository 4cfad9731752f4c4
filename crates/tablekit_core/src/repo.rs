//! Generic entity repository.
//!
//! # Responsibility
//! - Provide CRUD and filtered reads for any `Entity` from cached metadata.
//! - Delegate binding and execution to the context's connection.
//!
//! # Invariants
//! - Every operation goes through `ConnectionContext::parts`, so a closed
//!   context fails before any statement runs.
//! - `update`/`delete` report affected rows; zero rows is not an error here.
//! - Generated identities are written back onto inserted entities; explicit
//!   keys are never overwritten.

use crate::cache::{EntityMetadata, MetadataCache};
use crate::context::ConnectionContext;
use crate::driver::Command;
use crate::engine;
use crate::error::Result;
use crate::query;
use crate::schema::Entity;
use crate::value::{Params, Record, Value};
use log::debug;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const ID_PARAM: &str = "id";
const KEY_PARAM: &str = "key";

/// CRUD operations for one entity type.
pub struct Repository<T> {
    cache: Arc<MetadataCache>,
    command_timeout: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            command_timeout: self.command_timeout,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self {
            cache,
            command_timeout: None,
            _entity: PhantomData,
        }
    }

    /// Per-statement timeout handed to the engine.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn metadata(&self) -> Result<Arc<EntityMetadata>> {
        self.cache.metadata::<T>()
    }

    fn command(&self, sql: String, params: Params) -> Command {
        Command::new(sql)
            .params(params)
            .timeout(self.command_timeout)
    }

    fn by_id_command(&self, metadata: &EntityMetadata, id: Value) -> Result<Command> {
        let dialect = self.cache.dialect()?;
        let sql = format!(
            "{} WHERE {}=@{ID_PARAM};",
            metadata.select_statement(),
            dialect.quote(metadata.key_column())
        );
        Ok(self.command(sql, Params::new().bind(ID_PARAM, id)))
    }

    fn delete_command(&self, metadata: &EntityMetadata, key: Value) -> Result<Command> {
        let dialect = self.cache.dialect()?;
        let sql = format!(
            "DELETE FROM {} WHERE {}=@{KEY_PARAM};",
            dialect.quote(metadata.table_name()),
            dialect.quote(metadata.key_column())
        );
        Ok(self.command(sql, Params::new().bind(KEY_PARAM, key)))
    }

    fn filtered_command(&self, metadata: &EntityMetadata, filter: &str, params: Params) -> Command {
        self.command(filtered_sql(metadata.select_statement(), filter), params)
    }

    fn scalar_command(
        &self,
        metadata: &EntityMetadata,
        projection: &str,
        filter: &str,
        params: Params,
    ) -> Result<Command> {
        let dialect = self.cache.dialect()?;
        let prefix = format!(
            "SELECT {projection} FROM {}",
            dialect.quote(metadata.table_name())
        );
        Ok(self.command(filtered_sql(&prefix, filter), params))
    }

    /// Reads one entity by key; `None` when no row matches.
    pub fn get_by_id(
        &self,
        id: impl Into<Value>,
        context: &mut ConnectionContext,
    ) -> Result<Option<T>> {
        let metadata = self.metadata()?;
        let command = self.by_id_command(&metadata, id.into())?;
        let record = engine::single_or_none(query::fetch(context, &command)?)?;
        record.map(|record| metadata.decode(record)).transpose()
    }

    pub async fn get_by_id_async(
        &self,
        id: impl Into<Value>,
        context: &mut ConnectionContext,
    ) -> Result<Option<T>> {
        let metadata = self.metadata()?;
        let command = self.by_id_command(&metadata, id.into())?;
        let record = engine::single_or_none(query::fetch_async(context, &command).await?)?;
        record.map(|record| metadata.decode(record)).transpose()
    }

    /// Reads every row in engine order.
    pub fn get_all(&self, context: &mut ConnectionContext) -> Result<Vec<T>> {
        let metadata = self.metadata()?;
        let command = self.command(format!("{};", metadata.select_statement()), Params::new());
        decode_all("repo_get_all", &metadata, query::fetch(context, &command)?)
    }

    pub async fn get_all_async(&self, context: &mut ConnectionContext) -> Result<Vec<T>> {
        let metadata = self.metadata()?;
        let command = self.command(format!("{};", metadata.select_statement()), Params::new());
        decode_all("repo_get_all", &metadata, query::fetch_async(context, &command).await?)
    }

    /// Inserts `entity` and returns it with any generated identity applied.
    pub fn insert(&self, mut entity: T, context: &mut ConnectionContext) -> Result<T> {
        let metadata = self.metadata()?;
        let command = self.command(
            metadata.insert_statement().to_string(),
            metadata.params_of(&entity)?,
        );
        if metadata.has_generated_key() {
            let identity = engine::scalar(query::fetch(context, &command)?);
            apply_identity(&metadata, &mut entity, identity)?;
        } else {
            query::execute(context, &command)?;
        }
        Ok(entity)
    }

    pub async fn insert_async(&self, mut entity: T, context: &mut ConnectionContext) -> Result<T> {
        let metadata = self.metadata()?;
        let command = self.command(
            metadata.insert_statement().to_string(),
            metadata.params_of(&entity)?,
        );
        if metadata.has_generated_key() {
            let identity = engine::scalar(query::fetch_async(context, &command).await?);
            apply_identity(&metadata, &mut entity, identity)?;
        } else {
            query::execute_async(context, &command).await?;
        }
        Ok(entity)
    }

    /// Updates the row keyed by `entity`'s key; returns affected rows.
    pub fn update(&self, entity: &T, context: &mut ConnectionContext) -> Result<u64> {
        let metadata = self.metadata()?;
        let command = self.command(
            metadata.update_statement().to_string(),
            metadata.params_of(entity)?,
        );
        let changed = query::execute(context, &command)?;
        log_write("repo_update", &metadata, changed);
        Ok(changed)
    }

    pub async fn update_async(&self, entity: &T, context: &mut ConnectionContext) -> Result<u64> {
        let metadata = self.metadata()?;
        let command = self.command(
            metadata.update_statement().to_string(),
            metadata.params_of(entity)?,
        );
        let changed = query::execute_async(context, &command).await?;
        log_write("repo_update", &metadata, changed);
        Ok(changed)
    }

    /// Deletes the row with `key`; returns affected rows.
    pub fn delete(&self, key: impl Into<Value>, context: &mut ConnectionContext) -> Result<u64> {
        let metadata = self.metadata()?;
        let command = self.delete_command(&metadata, key.into())?;
        let changed = query::execute(context, &command)?;
        log_write("repo_delete", &metadata, changed);
        Ok(changed)
    }

    pub async fn delete_async(
        &self,
        key: impl Into<Value>,
        context: &mut ConnectionContext,
    ) -> Result<u64> {
        let metadata = self.metadata()?;
        let command = self.delete_command(&metadata, key.into())?;
        let changed = query::execute_async(context, &command).await?;
        log_write("repo_delete", &metadata, changed);
        Ok(changed)
    }

    /// Exactly one entity matching `filter`, e.g. `WHERE "Symbol"=@symbol`.
    pub fn query_single(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<T> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        metadata.decode(engine::single(query::fetch(context, &command)?)?)
    }

    pub async fn query_single_async(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<T> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        metadata.decode(engine::single(query::fetch_async(context, &command).await?)?)
    }

    /// First entity matching `filter`, if any.
    pub fn query_first(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Option<T>> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        engine::first_or_none(query::fetch(context, &command)?)
            .map(|record| metadata.decode(record))
            .transpose()
    }

    pub async fn query_first_async(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Option<T>> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        engine::first_or_none(query::fetch_async(context, &command).await?)
            .map(|record| metadata.decode(record))
            .transpose()
    }

    pub fn query_many(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Vec<T>> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        decode_all("repo_query_many", &metadata, query::fetch(context, &command)?)
    }

    pub async fn query_many_async(
        &self,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Vec<T>> {
        let metadata = self.metadata()?;
        let command = self.filtered_command(&metadata, filter, params);
        decode_all(
            "repo_query_many",
            &metadata,
            query::fetch_async(context, &command).await?,
        )
    }

    /// `SELECT <projection> FROM <table> <filter>`, first column of the first
    /// row; e.g. `scalar::<i64>("COUNT(*)", "", Params::new(), ctx)`.
    pub fn scalar<V: DeserializeOwned>(
        &self,
        projection: &str,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Option<V>> {
        let metadata = self.metadata()?;
        let command = self.scalar_command(&metadata, projection, filter, params)?;
        query::read_scalar(context, &command)
    }

    pub async fn scalar_async<V: DeserializeOwned>(
        &self,
        projection: &str,
        filter: &str,
        params: Params,
        context: &mut ConnectionContext,
    ) -> Result<Option<V>> {
        let metadata = self.metadata()?;
        let command = self.scalar_command(&metadata, projection, filter, params)?;
        query::read_scalar_async(context, &command).await
    }
}

fn filtered_sql(prefix: &str, filter: &str) -> String {
    let filter = filter.trim().trim_end_matches(';');
    if filter.is_empty() {
        format!("{prefix};")
    } else {
        format!("{prefix} {filter};")
    }
}

fn decode_all<T: DeserializeOwned>(
    event: &str,
    metadata: &EntityMetadata,
    records: Vec<Record>,
) -> Result<Vec<T>> {
    debug!(
        "event={} module=repo status=ok table={} rows={}",
        event,
        metadata.table_name(),
        records.len()
    );
    records
        .into_iter()
        .map(|record| metadata.decode(record))
        .collect()
}

fn apply_identity<T: Entity>(
    metadata: &EntityMetadata,
    entity: &mut T,
    identity: Option<Value>,
) -> Result<()> {
    match identity {
        Some(value) if !value.is_null() => {
            metadata.assign_identity(entity, &value)?;
            debug!(
                "event=repo_insert module=repo status=ok table={} identity={:?}",
                metadata.table_name(),
                value
            );
        }
        _ => debug!(
            "event=repo_insert module=repo status=ok table={} identity=none",
            metadata.table_name()
        ),
    }
    Ok(())
}

fn log_write(event: &str, metadata: &EntityMetadata, changed: u64) {
    debug!(
        "event={} module=repo status=ok table={} rows={}",
        event,
        metadata.table_name(),
        changed
    );
}

#[cfg(test)]
mod tests {
    use super::filtered_sql;

    #[test]
    fn filtered_sql_appends_trimmed_filter() {
        assert_eq!(
            filtered_sql("SELECT \"Id\" FROM \"t\"", " WHERE \"Id\">@min; "),
            "SELECT \"Id\" FROM \"t\" WHERE \"Id\">@min;"
        );
        assert_eq!(filtered_sql("SELECT 1", "  "), "SELECT 1;");
    }
}
