//! Per-entity SQL metadata and its builder.
//!
//! # Invariants
//! - A built `EntityMetadata` has a table name, at least one column and
//!   exactly one key column.
//! - Statement text depends only on the entity schema and the dialect, so
//!   rebuilding yields byte-identical strings.

use crate::dialect::Dialect;
use crate::error::{ConfigError, Error, Result};
use crate::schema::{Entity, EntitySchema, FieldKind, KeyKind};
use crate::value::{Params, Record, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Map;

/// One mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Entity field name.
    pub field: String,
    /// SQL column name.
    pub name: String,
    pub key: KeyKind,
    pub kind: FieldKind,
}

impl ColumnMetadata {
    pub fn is_key(&self) -> bool {
        self.key.is_key()
    }
}

/// Derived, immutable SQL facts about one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    entity: &'static str,
    table_name: String,
    columns: Vec<ColumnMetadata>,
    key_index: usize,
    concatenated_columns: String,
    select_statement: String,
    insert_statement: String,
    update_statement: String,
}

impl EntityMetadata {
    /// Builds metadata for `T` under `dialect`.
    pub fn build<T: Entity>(dialect: &Dialect) -> Result<Self> {
        Self::from_schema(short_type_name::<T>(), T::schema(), dialect)
    }

    pub(crate) fn from_schema(
        entity: &'static str,
        schema: EntitySchema,
        dialect: &Dialect,
    ) -> Result<Self> {
        let table_name = match schema.table {
            Some(table) if !table.trim().is_empty() => table,
            _ => return Err(ConfigError::MissingTableName { entity }.into()),
        };

        let columns = schema
            .fields
            .iter()
            .map(|field| ColumnMetadata {
                field: field.name.clone(),
                name: field.column_name().to_string(),
                key: field.key,
                kind: field.kind,
            })
            .collect::<Vec<_>>();
        if columns.is_empty() {
            return Err(ConfigError::NoColumns { entity }.into());
        }

        let keys = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_key())
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let key_index = match keys.as_slice() {
            [] => return Err(ConfigError::MissingKey { entity }.into()),
            [index] => *index,
            _ => {
                let names = keys
                    .iter()
                    .map(|index| columns[*index].name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ConfigError::MultipleKeys {
                    entity,
                    columns: names,
                }
                .into());
            }
        };

        let table = dialect.quote(&table_name);
        let concatenated_columns = columns
            .iter()
            .map(|column| dialect.quote(&column.name))
            .collect::<Vec<_>>()
            .join(",");
        let select_statement = format!("SELECT {concatenated_columns} FROM {table}");
        let insert_statement = build_insert(&table, &columns, key_index, dialect);
        let update_statement = build_update(&table, &columns, key_index, dialect);

        Ok(Self {
            entity,
            table_name,
            columns,
            key_index,
            concatenated_columns,
            select_statement,
            insert_statement,
            update_statement,
        })
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn key(&self) -> &ColumnMetadata {
        &self.columns[self.key_index]
    }

    pub fn key_column(&self) -> &str {
        &self.key().name
    }

    pub fn has_generated_key(&self) -> bool {
        self.key().key == KeyKind::Generated
    }

    /// Quoted column list in declaration order, for projections.
    pub fn concatenated_columns(&self) -> &str {
        &self.concatenated_columns
    }

    /// `SELECT <columns> FROM <table>` without a terminator.
    pub fn select_statement(&self) -> &str {
        &self.select_statement
    }

    pub fn insert_statement(&self) -> &str {
        &self.insert_statement
    }

    pub fn update_statement(&self) -> &str {
        &self.update_statement
    }

    /// Collects the entity's field values as parameters named by column.
    pub fn params_of<T: Serialize>(&self, entity: &T) -> Result<Params> {
        let fields = to_object(self.entity, entity)?;
        let mut params = Params::new();
        for column in &self.columns {
            let value = fields.get(&column.field).ok_or_else(|| {
                Error::Mapping(format!(
                    "entity `{}` has no field `{}`",
                    self.entity, column.field
                ))
            })?;
            params.set(column.name.as_str(), Value::from_json_as(value, column.kind)?);
        }
        Ok(params)
    }

    /// Maps a result row onto the entity, renaming columns back to fields.
    pub fn decode<T: DeserializeOwned>(&self, record: Record) -> Result<T> {
        let object = record
            .into_columns()
            .into_iter()
            .map(|(name, value)| {
                match self
                    .columns
                    .iter()
                    .find(|column| column.name.eq_ignore_ascii_case(&name))
                {
                    Some(column) => (column.field.clone(), value.to_json_as(column.kind)),
                    None => (name, value.to_json()),
                }
            })
            .collect::<Map<_, _>>();
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|err| {
            Error::Mapping(format!("cannot map row onto `{}`: {err}", self.entity))
        })
    }

    /// Writes a generated identity onto the key field.
    ///
    /// Returns `false` without touching the entity when the key is explicit
    /// or the key field does not resolve.
    pub fn assign_identity<T>(&self, entity: &mut T, value: &Value) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.has_generated_key() {
            return Ok(false);
        }

        let mut fields = to_object(self.entity, entity)?;
        let field = &self.key().field;
        let Some(slot) = fields.get_mut(field) else {
            return Ok(false);
        };
        *slot = value.to_json();

        *entity = serde_json::from_value(serde_json::Value::Object(fields)).map_err(|err| {
            Error::Mapping(format!(
                "cannot assign identity to `{}.{field}`: {err}",
                self.entity
            ))
        })?;
        Ok(true)
    }
}

fn build_insert(
    table: &str,
    columns: &[ColumnMetadata],
    key_index: usize,
    dialect: &Dialect,
) -> String {
    let key = &columns[key_index];
    let generated = key.key == KeyKind::Generated;
    let inserted = columns
        .iter()
        .filter(|column| !(generated && column.is_key()))
        .collect::<Vec<_>>();
    let suffix = if generated {
        dialect.identity_suffix(&key.name)
    } else {
        String::new()
    };

    if inserted.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES{suffix};");
    }

    let names = inserted
        .iter()
        .map(|column| dialect.quote(&column.name))
        .collect::<Vec<_>>()
        .join(",");
    let values = inserted
        .iter()
        .map(|column| format!("@{}", column.name))
        .collect::<Vec<_>>()
        .join(",");
    format!("INSERT INTO {table} ({names}) VALUES ({values}){suffix};")
}

fn build_update(
    table: &str,
    columns: &[ColumnMetadata],
    key_index: usize,
    dialect: &Dialect,
) -> String {
    let key = &columns[key_index];
    let mut assignments = columns
        .iter()
        .filter(|column| !column.is_key())
        .map(|column| format!("{}=@{}", dialect.quote(&column.name), column.name))
        .collect::<Vec<_>>();
    // Key-only tables have nothing to set; keep the statement valid.
    if assignments.is_empty() {
        assignments.push(format!("{}=@{}", dialect.quote(&key.name), key.name));
    }
    format!(
        "UPDATE {table} SET {} WHERE {}=@{};",
        assignments.join(","),
        dialect.quote(&key.name),
        key.name
    )
}

fn to_object<T: Serialize>(
    entity_name: &str,
    entity: &T,
) -> Result<Map<String, serde_json::Value>> {
    match serde_json::to_value(entity)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(Error::Mapping(format!(
            "entity `{entity_name}` must serialize as a struct, got `{other}`"
        ))),
    }
}

/// Type name without its module path.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::{short_type_name, EntityMetadata};
    use crate::dialect::Dialect;
    use crate::error::{ConfigError, Error};
    use crate::schema::EntitySchema;

    struct Plain;

    fn build(schema: EntitySchema) -> Result<EntityMetadata, Error> {
        EntityMetadata::from_schema("Probe", schema, &Dialect::SQLITE)
    }

    #[test]
    fn short_type_name_strips_module_path() {
        assert_eq!(short_type_name::<Plain>(), "Plain");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec<alloc::string::String>");
    }

    #[test]
    fn blank_table_name_is_rejected() {
        let err = build(EntitySchema::table("  ").key("id")).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigError::MissingTableName { entity: "Probe" })
        ));
    }

    #[test]
    fn key_only_entity_inserts_default_values() {
        let metadata = build(EntitySchema::table("counters").key("id")).unwrap();
        assert_eq!(
            metadata.insert_statement(),
            "INSERT INTO \"counters\" DEFAULT VALUES RETURNING \"id\";"
        );
        assert_eq!(
            metadata.update_statement(),
            "UPDATE \"counters\" SET \"id\"=@id WHERE \"id\"=@id;"
        );
    }

    #[test]
    fn multiple_keys_are_listed_in_error() {
        let err = build(
            EntitySchema::table("pairs")
                .key("left")
                .explicit_key("right")
                .field("label"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "entity `Probe` declares more than one key column: left, right"
        );
    }
}
