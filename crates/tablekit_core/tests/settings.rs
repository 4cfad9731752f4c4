mod common;

use common::{Element, ELEMENTS_DDL};
use std::fs;
use std::time::Duration;
use tablekit_core::{
    query, Command, ConfigError, Dialect, Error, StorageManager, StorageSettings,
};

#[test]
fn loaded_settings_build_a_working_manager() {
    let dir = tempfile::tempdir().unwrap();
    let main_db = dir.path().join("main.db");
    let archive_db = dir.path().join("archive.db");
    let settings_path = dir.path().join("tablekit.toml");
    fs::write(
        &settings_path,
        format!(
            r#"
dialect = "sqlite"
command_timeout_ms = 1500

[[databases]]
driver = "sqlite"
path = '{}'

[[databases]]
name = "Archive"
driver = "sqlite3"
path = '{}'
"#,
            main_db.display(),
            archive_db.display()
        ),
    )
    .unwrap();

    let settings = StorageSettings::load(&settings_path).unwrap();
    assert_eq!(settings.command_timeout(), Some(Duration::from_millis(1500)));

    let manager = StorageManager::new(settings.into_config().unwrap()).unwrap();
    assert_eq!(manager.database_names(), vec!["Default", "Archive"]);
    assert_eq!(manager.cache().dialect().unwrap(), Dialect::SQLITE);

    let mut unit = manager.start_unit_of_work(Some("archive")).unwrap();
    query::execute(&mut unit, &Command::new(ELEMENTS_DDL)).unwrap();
    let helium = manager
        .repository::<Element>()
        .insert(Element::new("Helium", "He"), &mut unit)
        .unwrap();
    unit.mark_successful();
    unit.close().unwrap();

    let mut session = manager.start_session(Some("Archive")).unwrap();
    let loaded = manager
        .repository::<Element>()
        .get_by_id(helium.id, &mut session)
        .unwrap();
    assert_eq!(loaded, Some(helium));
    assert!(archive_db.exists());
    assert!(!main_db.exists());
}

#[test]
fn missing_file_is_invalid_settings() {
    let dir = tempfile::tempdir().unwrap();
    let err = StorageSettings::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::InvalidSettings(_))
    ));
}

#[test]
fn duplicate_names_in_settings_are_rejected() {
    let settings = StorageSettings::from_toml_str(
        r#"
[[databases]]
driver = "sqlite"
path = ":memory:"

[[databases]]
name = "DEFAULT"
driver = "sqlite"
path = ":memory:"
"#,
    )
    .unwrap();
    assert!(matches!(
        settings.into_config(),
        Err(Error::Configuration(ConfigError::DuplicateDatabase(_)))
    ));
}

#[test]
fn drivers_without_builtin_connection_are_rejected() {
    let settings = StorageSettings::from_toml_str(
        "[[databases]]\ndriver = \"postgresql\"\npath = \"ignored\"\n",
    )
    .unwrap();
    assert!(matches!(
        settings.into_config(),
        Err(Error::Configuration(ConfigError::InvalidSettings(_)))
    ));
}
