//! Type-keyed memoization of entity SQL metadata.
//!
//! # Responsibility
//! - Build `EntityMetadata` once per entity type and reuse it.
//! - Hold the dialect every statement is rendered for.
//!
//! # Invariants
//! - The dialect is selected at most once; metadata cannot be built before
//!   it is selected.
//! - Readers only ever observe fully built entries. Concurrent first access
//!   may build the same entry twice; the later insert wins and both are
//!   identical.

mod metadata;

pub use metadata::{ColumnMetadata, EntityMetadata};
pub(crate) use metadata::short_type_name;

use crate::dialect::Dialect;
use crate::error::{ConfigError, Result};
use crate::schema::Entity;
use crate::value::Value;
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Process-shared cache of per-entity metadata.
#[derive(Debug, Default)]
pub struct MetadataCache {
    dialect: OnceCell<Dialect>,
    tables: RwLock<HashMap<TypeId, Arc<EntityMetadata>>>,
    builds: AtomicUsize,
}

impl MetadataCache {
    /// Creates a cache whose dialect is selected later.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        let cache = Self::new();
        let _ = cache.dialect.set(dialect);
        cache
    }

    /// Selects the dialect; repeated selection of the same dialect is a no-op.
    pub fn select_dialect(&self, dialect: Dialect) -> Result<()> {
        let selected = *self.dialect.get_or_init(|| {
            info!(
                "event=dialect_select module=cache status=ok dialect={}",
                dialect.name
            );
            dialect
        });
        if selected != dialect {
            return Err(ConfigError::DialectConflict {
                selected: selected.name,
                requested: dialect.name,
            }
            .into());
        }
        Ok(())
    }

    pub fn dialect(&self) -> Result<Dialect> {
        self.dialect
            .get()
            .copied()
            .ok_or_else(|| ConfigError::DialectNotSelected.into())
    }

    /// Returns the cached metadata for `T`, building it on first use.
    pub fn metadata<T: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        let key = TypeId::of::<T>();
        if let Some(found) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(found));
        }

        let dialect = self.dialect()?;
        let started_at = Instant::now();
        let built = Arc::new(EntityMetadata::build::<T>(&dialect)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            "event=metadata_build module=cache status=ok entity={} table={} duration_ms={}",
            built.entity(),
            built.table_name(),
            started_at.elapsed().as_millis()
        );

        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&built));
        Ok(built)
    }

    pub fn table_name<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.table_name().to_string())
    }

    /// Quoted, comma-separated column list of `T`.
    pub fn columns<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.concatenated_columns().to_string())
    }

    pub fn key_column<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.key_column().to_string())
    }

    pub fn insert_statement<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.insert_statement().to_string())
    }

    pub fn update_statement<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.update_statement().to_string())
    }

    pub fn select_statement<T: Entity>(&self) -> Result<String> {
        Ok(self.metadata::<T>()?.select_statement().to_string())
    }

    /// Writes a database-returned identity onto `entity`'s key field.
    ///
    /// No-op (`Ok(false)`) for explicit keys or an unresolved key field.
    pub fn try_set_identity<T: Entity>(
        &self,
        entity: &mut T,
        value: impl Into<Value>,
    ) -> Result<bool> {
        self.metadata::<T>()?.assign_identity(entity, &value.into())
    }

    /// Number of metadata builds performed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cached entity types.
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
