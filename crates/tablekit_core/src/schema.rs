//! Declarative per-entity metadata surface.
//!
//! # Responsibility
//! - Let entity types declare their table, columns and key once.
//! - Stay purely descriptive; validation happens when metadata is built.
//!
//! # Invariants
//! - Field names are the entity's serde field names.
//! - Declaration order is column order.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// How a key column receives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Regular column.
    None,
    /// Server-generated identity, written back after insert.
    Generated,
    /// Caller-supplied key, never overwritten.
    Explicit,
}

impl KeyKind {
    pub fn is_key(self) -> bool {
        !matches!(self, KeyKind::None)
    }
}

/// Storage shape of a field whose serde form differs from its column value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldKind {
    /// Stored as serde produces it.
    #[default]
    Plain,
    /// `bool` stored as an integer 0/1.
    Bool,
    /// `Vec<u8>` stored as a BLOB.
    Blob,
}

/// A record type mapped to one table row.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tablekit_core::{Entity, EntitySchema};
///
/// #[derive(Serialize, Deserialize)]
/// struct Element {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for Element {
///     fn schema() -> EntitySchema {
///         EntitySchema::table("elements")
///             .key("id")
///             .column("name", "display_name")
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn schema() -> EntitySchema;
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub column: Option<String>,
    pub key: KeyKind,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            key: KeyKind::None,
            kind: FieldKind::Plain,
        }
    }

    /// Overrides the SQL column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn key(mut self) -> Self {
        self.key = KeyKind::Generated;
        self
    }

    pub fn explicit_key(mut self) -> Self {
        self.key = KeyKind::Explicit;
        self
    }

    pub fn bool(mut self) -> Self {
        self.kind = FieldKind::Bool;
        self
    }

    pub fn blob(mut self) -> Self {
        self.kind = FieldKind::Blob;
        self
    }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(self.name.as_str())
    }
}

/// Table and field declarations for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: Option<String>,
    pub fields: Vec<FieldSchema>,
}

impl EntitySchema {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: Some(name.into()),
            fields: Vec::new(),
        }
    }

    /// Schema without a table declaration.
    pub fn untitled() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name))
    }

    pub fn column(self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name).column(column))
    }

    pub fn bool_field(self, name: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name).bool())
    }

    pub fn blob_field(self, name: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name).blob())
    }

    pub fn key(self, name: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name).key())
    }

    pub fn explicit_key(self, name: impl Into<String>) -> Self {
        self.with(FieldSchema::new(name).explicit_key())
    }
}
