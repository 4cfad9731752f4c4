mod common;

use common::Element;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use tablekit_core::{
    ConfigError, Dialect, Entity, EntitySchema, Error, FieldSchema, MetadataCache,
};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Untabled {
    id: i64,
}

impl Entity for Untabled {
    fn schema() -> EntitySchema {
        EntitySchema::untitled().key("id")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Keyless {
    name: String,
}

impl Entity for Keyless {
    fn schema() -> EntitySchema {
        EntitySchema::table("keyless").field("name")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TwoKeys {
    left: i64,
    right: i64,
}

impl Entity for TwoKeys {
    fn schema() -> EntitySchema {
        EntitySchema::table("pairs").key("left").key("right")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Empty {}

impl Entity for Empty {
    fn schema() -> EntitySchema {
        EntitySchema::table("empty")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tag {
    id: Uuid,
    label: String,
}

impl Entity for Tag {
    fn schema() -> EntitySchema {
        EntitySchema::table("tags")
            .with(FieldSchema::new("id").explicit_key())
            .field("label")
    }
}

#[test]
fn lookups_are_idempotent_and_build_once() {
    let cache = MetadataCache::with_dialect(Dialect::SQLITE);

    let first = (
        cache.table_name::<Element>().unwrap(),
        cache.columns::<Element>().unwrap(),
        cache.insert_statement::<Element>().unwrap(),
        cache.update_statement::<Element>().unwrap(),
    );
    for _ in 0..3 {
        let again = (
            cache.table_name::<Element>().unwrap(),
            cache.columns::<Element>().unwrap(),
            cache.insert_statement::<Element>().unwrap(),
            cache.update_statement::<Element>().unwrap(),
        );
        assert_eq!(again, first);
    }

    assert_eq!(cache.build_count(), 1);
    assert_eq!(first.0, "elements");
    assert_eq!(first.1, "\"Id\",\"Name\",\"Symbol\"");
    assert_eq!(
        first.2,
        "INSERT INTO \"elements\" (\"Name\",\"Symbol\") VALUES (@Name,@Symbol) RETURNING \"Id\";"
    );
    assert_eq!(
        first.3,
        "UPDATE \"elements\" SET \"Name\"=@Name,\"Symbol\"=@Symbol WHERE \"Id\"=@Id;"
    );
    assert_eq!(cache.key_column::<Element>().unwrap(), "Id");
}

#[test]
fn insert_suffix_follows_dialect() {
    let mysql = MetadataCache::with_dialect(Dialect::MYSQL);
    assert_eq!(
        mysql.insert_statement::<Element>().unwrap(),
        "INSERT INTO `elements` (`Name`,`Symbol`) VALUES (@Name,@Symbol); SELECT LAST_INSERT_ID();"
    );

    let mssql = MetadataCache::with_dialect(Dialect::SQL_SERVER);
    assert_eq!(
        mssql.insert_statement::<Element>().unwrap(),
        "INSERT INTO [elements] ([Name],[Symbol]) VALUES (@Name,@Symbol); SELECT CAST(SCOPE_IDENTITY() AS BIGINT);"
    );
}

#[test]
fn invalid_entities_fail_naming_the_type() {
    let cache = MetadataCache::with_dialect(Dialect::SQLITE);

    let err = cache.table_name::<Untabled>().unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::MissingTableName { entity: "Untabled" })
    ));
    assert!(err.to_string().contains("Untabled"));

    assert!(matches!(
        cache.table_name::<Keyless>(),
        Err(Error::Configuration(ConfigError::MissingKey { entity: "Keyless" }))
    ));
    assert!(matches!(
        cache.table_name::<Empty>(),
        Err(Error::Configuration(ConfigError::NoColumns { entity: "Empty" }))
    ));

    // Failed builds are not cached.
    assert!(cache.is_empty());
}

#[test]
fn two_keys_fail_at_first_build() {
    let cache = MetadataCache::with_dialect(Dialect::SQLITE);
    let err = cache.metadata::<TwoKeys>().unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::MultipleKeys { entity: "TwoKeys", .. })
    ));
    assert!(err.to_string().contains("left, right"));
}

#[test]
fn dialect_must_be_selected_first() {
    let cache = MetadataCache::new();
    assert!(matches!(
        cache.insert_statement::<Element>(),
        Err(Error::Configuration(ConfigError::DialectNotSelected))
    ));

    cache.select_dialect(Dialect::POSTGRES).unwrap();
    cache.select_dialect(Dialect::POSTGRES).unwrap();
    assert!(matches!(
        cache.select_dialect(Dialect::SQLITE),
        Err(Error::Configuration(ConfigError::DialectConflict { .. }))
    ));
    assert!(cache.insert_statement::<Element>().is_ok());
}

#[test]
fn try_set_identity_only_touches_generated_keys() {
    let cache = MetadataCache::with_dialect(Dialect::SQLITE);

    let mut gold = Element::new("Gold", "Au");
    assert!(cache.try_set_identity(&mut gold, 79i64).unwrap());
    assert_eq!(gold.id, 79);

    let id = Uuid::new_v4();
    let mut tag = Tag {
        id,
        label: "noble".to_string(),
    };
    assert!(!cache.try_set_identity(&mut tag, 5i64).unwrap());
    assert_eq!(tag.id, id);
}

#[test]
fn concurrent_first_access_sees_complete_entries() {
    let cache = Arc::new(MetadataCache::with_dialect(Dialect::SQLITE));
    let expected = MetadataCache::with_dialect(Dialect::SQLITE)
        .insert_statement::<Element>()
        .unwrap();

    let handles = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let metadata = cache.metadata::<Element>().unwrap();
                (
                    metadata.insert_statement().to_string(),
                    metadata.columns().len(),
                )
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let (insert, columns) = handle.join().unwrap();
        assert_eq!(insert, expected);
        assert_eq!(columns, 3);
    }
    assert_eq!(cache.len(), 1);
    assert!(cache.build_count() >= 1);
}
