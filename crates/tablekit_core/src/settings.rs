//! Declarative storage settings loaded from TOML.
//!
//! ```toml
//! dialect = "sqlite"
//! command_timeout_ms = 5000
//!
//! [logging]
//! level = "info"
//! directory = "/var/log/app"
//!
//! [[databases]]
//! name = "Default"
//! driver = "sqlite"
//! path = "/var/lib/app/main.db"
//! ```

use crate::dialect::Dialect;
use crate::driver::sqlite::SqliteConnection;
use crate::error::{ConfigError, Error, Result};
use crate::storage::{StorageConfig, DEFAULT_DATABASE};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Dialect name or alias; taken from the first connection when omitted.
    pub dialect: Option<String>,
    pub command_timeout_ms: Option<u64>,
    pub logging: Option<LoggingSettings>,
    #[serde(default)]
    pub databases: Vec<DatabaseSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    /// Logical name; the unnamed entry is the default database.
    pub name: Option<String>,
    pub driver: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub directory: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StorageSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|err| ConfigError::InvalidSettings(format!("invalid TOML: {err}")).into())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loaded = fs::read_to_string(path)
            .map_err(|err| {
                Error::from(ConfigError::InvalidSettings(format!(
                    "cannot read {}: {err}",
                    path.display()
                )))
            })
            .and_then(|content| Self::from_toml_str(&content));

        match &loaded {
            Ok(settings) => info!(
                "event=settings_load module=settings status=ok path={} databases={}",
                path.display(),
                settings.databases.len()
            ),
            Err(err) => error!(
                "event=settings_load module=settings status=error path={} error={}",
                path.display(),
                err
            ),
        }
        loaded
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    /// Builds a `StorageConfig` with one registration per database entry.
    pub fn into_config(self) -> Result<StorageConfig> {
        let mut config = StorageConfig::new();
        config.command_timeout(self.command_timeout());

        if let Some(name) = self.dialect.as_deref() {
            let dialect =
                Dialect::for_driver(name).ok_or_else(|| ConfigError::UnknownDriver(name.into()))?;
            config.dialect(dialect)?;
        }

        for database in self.databases {
            let dialect = Dialect::for_driver(&database.driver)
                .ok_or_else(|| ConfigError::UnknownDriver(database.driver.clone()))?;
            if dialect != Dialect::SQLITE {
                return Err(ConfigError::InvalidSettings(format!(
                    "driver `{}` has no built-in connection; register it programmatically",
                    database.driver
                ))
                .into());
            }
            let name = database
                .name
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
            config.add_database(name, SqliteConnection::factory(&database.path))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::StorageSettings;
    use crate::error::{ConfigError, Error};
    use std::time::Duration;

    #[test]
    fn parses_full_document() {
        let settings = StorageSettings::from_toml_str(
            r#"
dialect = "sqlite3"
command_timeout_ms = 2500

[logging]
directory = "/tmp/logs"

[[databases]]
driver = "sqlite"
path = ":memory:"

[[databases]]
name = "Reports"
driver = "sqlite"
path = "reports.db"
"#,
        )
        .unwrap();

        assert_eq!(settings.command_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(settings.logging.as_ref().unwrap().level, "info");
        assert_eq!(settings.databases.len(), 2);
        assert_eq!(settings.databases[0].name, None);
    }

    #[test]
    fn unknown_keys_are_invalid_settings() {
        let err = StorageSettings::from_toml_str("dialekt = \"sqlite\"").unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigError::InvalidSettings(_))
        ));
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let settings = StorageSettings::from_toml_str(
            "[[databases]]\ndriver = \"oracle\"\npath = \"x\"\n",
        )
        .unwrap();
        assert!(matches!(
            settings.into_config(),
            Err(Error::Configuration(ConfigError::UnknownDriver(name))) if name == "oracle"
        ));
    }
}
