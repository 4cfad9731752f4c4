//! Row-count contracts layered over raw query results.

use crate::error::{Error, Result};
use crate::value::{Record, Value};
use thiserror::Error;

/// A query returned a row count its caller's contract forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} row(s), query returned {actual}")]
pub struct UnexpectedRowCount {
    pub expected: &'static str,
    pub actual: usize,
}

fn row_count_error(expected: &'static str, actual: usize) -> Error {
    Error::execution(UnexpectedRowCount { expected, actual })
}

/// Exactly one row.
pub fn single(records: Vec<Record>) -> Result<Record> {
    match single_or_none(records)? {
        Some(record) => Ok(record),
        None => Err(row_count_error("exactly 1", 0)),
    }
}

/// Zero or one row.
pub fn single_or_none(records: Vec<Record>) -> Result<Option<Record>> {
    let actual = records.len();
    if actual > 1 {
        return Err(row_count_error("at most 1", actual));
    }
    Ok(records.into_iter().next())
}

/// First of at least one row.
pub fn first(records: Vec<Record>) -> Result<Record> {
    first_or_none(records).ok_or_else(|| row_count_error("at least 1", 0))
}

pub fn first_or_none(records: Vec<Record>) -> Option<Record> {
    records.into_iter().next()
}

/// First column of the first row; `None` when no row came back.
pub fn scalar(records: Vec<Record>) -> Option<Value> {
    first_or_none(records).and_then(|record| record.first_value().cloned())
}

#[cfg(test)]
mod tests {
    use super::{first, scalar, single, single_or_none, UnexpectedRowCount};
    use crate::error::Error;
    use crate::value::{Record, Value};
    use std::error::Error as _;

    fn rows(count: i64) -> Vec<Record> {
        (0..count).map(|id| Record::new().with("id", id)).collect()
    }

    #[test]
    fn single_rejects_zero_and_many() {
        assert!(single(rows(1)).is_ok());
        assert!(matches!(single(rows(0)), Err(Error::Execution { .. })));

        let err = single_or_none(rows(2)).unwrap_err();
        let cause = err
            .source()
            .and_then(|source| source.downcast_ref::<UnexpectedRowCount>())
            .unwrap();
        assert_eq!(cause.actual, 2);
    }

    #[test]
    fn first_takes_leading_row() {
        let record = first(rows(3)).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(0)));
        assert!(first(rows(0)).is_err());
    }

    #[test]
    fn scalar_is_none_without_rows() {
        assert_eq!(scalar(rows(0)), None);
        assert_eq!(scalar(rows(2)), Some(Value::Integer(0)));
    }
}
