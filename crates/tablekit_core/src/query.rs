//! Ad-hoc statement helpers for query components.
//!
//! Query components run hand-written SQL that is not tied to one entity
//! type. Rows decode by column name into any deserializable type.

use crate::context::ConnectionContext;
use crate::driver::Command;
use crate::engine;
use crate::error::Result;
use crate::value::Record;
use serde::de::DeserializeOwned;

pub fn fetch(context: &mut ConnectionContext, command: &Command) -> Result<Vec<Record>> {
    let parts = context.parts()?;
    parts.connection.query(parts.transaction, command)
}

pub async fn fetch_async(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Vec<Record>> {
    let parts = context.parts()?;
    parts.connection.query_async(parts.transaction, command).await
}

/// Exactly one row.
pub fn read_single<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<T> {
    engine::single(fetch(context, command)?)?.decode()
}

pub async fn read_single_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<T> {
    engine::single(fetch_async(context, command).await?)?.decode()
}

/// Zero or one row.
pub fn read_single_or_none<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::single_or_none(fetch(context, command)?)?
        .map(|record| record.decode())
        .transpose()
}

pub async fn read_single_or_none_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::single_or_none(fetch_async(context, command).await?)?
        .map(|record| record.decode())
        .transpose()
}

/// First of at least one row.
pub fn read_first<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<T> {
    engine::first(fetch(context, command)?)?.decode()
}

pub async fn read_first_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<T> {
    engine::first(fetch_async(context, command).await?)?.decode()
}

pub fn read_first_or_none<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::first_or_none(fetch(context, command)?)
        .map(|record| record.decode())
        .transpose()
}

pub async fn read_first_or_none_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::first_or_none(fetch_async(context, command).await?)
        .map(|record| record.decode())
        .transpose()
}

pub fn read_many<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Vec<T>> {
    fetch(context, command)?
        .iter()
        .map(Record::decode)
        .collect()
}

pub async fn read_many_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Vec<T>> {
    fetch_async(context, command)
        .await?
        .iter()
        .map(Record::decode)
        .collect()
}

/// First column of the first row; `None` for no row or SQL `NULL`.
pub fn read_scalar<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::scalar(fetch(context, command)?)
        .filter(|value| !value.is_null())
        .map(|value| value.decode())
        .transpose()
}

pub async fn read_scalar_async<T: DeserializeOwned>(
    context: &mut ConnectionContext,
    command: &Command,
) -> Result<Option<T>> {
    engine::scalar(fetch_async(context, command).await?)
        .filter(|value| !value.is_null())
        .map(|value| value.decode())
        .transpose()
}

/// Runs a non-query statement and returns the affected-row count.
pub fn execute(context: &mut ConnectionContext, command: &Command) -> Result<u64> {
    let parts = context.parts()?;
    parts.connection.execute(parts.transaction, command)
}

pub async fn execute_async(context: &mut ConnectionContext, command: &Command) -> Result<u64> {
    let parts = context.parts()?;
    parts.connection.execute_async(parts.transaction, command).await
}
