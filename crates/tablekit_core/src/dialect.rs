//! SQL dialect profiles.
//!
//! A dialect decides how identifiers are quoted and which suffix turns an
//! `INSERT` into a statement that yields the generated identity. New back
//! ends add a `Dialect` value; the metadata builder only consumes the
//! profile.

/// Identity-retrieval and quoting conventions of one SQL back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Driver identity, e.g. `sqlite`.
    pub name: &'static str,
    /// Suffix appended to generated-identity inserts; `{key}` is replaced by
    /// the quoted key column.
    pub identity_clause: &'static str,
    pub quote_open: &'static str,
    pub quote_close: &'static str,
}

impl Dialect {
    pub const SQLITE: Dialect = Dialect::new("sqlite", " RETURNING {key}", "\"", "\"");
    pub const POSTGRES: Dialect = Dialect::new("postgres", " RETURNING {key}", "\"", "\"");
    pub const MYSQL: Dialect = Dialect::new("mysql", "; SELECT LAST_INSERT_ID()", "`", "`");
    pub const SQL_SERVER: Dialect = Dialect::new(
        "sqlserver",
        "; SELECT CAST(SCOPE_IDENTITY() AS BIGINT)",
        "[",
        "]",
    );

    /// Built-in profiles, looked up by [`Dialect::for_driver`].
    pub const BUILT_IN: &'static [Dialect] = &[
        Dialect::SQLITE,
        Dialect::POSTGRES,
        Dialect::MYSQL,
        Dialect::SQL_SERVER,
    ];

    pub const fn new(
        name: &'static str,
        identity_clause: &'static str,
        quote_open: &'static str,
        quote_close: &'static str,
    ) -> Self {
        Self {
            name,
            identity_clause,
            quote_open,
            quote_close,
        }
    }

    /// Resolves a built-in profile from a driver name or common alias.
    pub fn for_driver(driver: &str) -> Option<Dialect> {
        let normalized = driver.trim().to_ascii_lowercase();
        let canonical = match normalized.as_str() {
            "sqlite3" => "sqlite",
            "postgresql" | "pg" => "postgres",
            "mariadb" => "mysql",
            "mssql" => "sqlserver",
            other => other,
        };
        Self::BUILT_IN
            .iter()
            .copied()
            .find(|dialect| dialect.name == canonical)
    }

    pub fn quote(&self, identifier: &str) -> String {
        format!("{}{identifier}{}", self.quote_open, self.quote_close)
    }

    pub fn identity_suffix(&self, key_column: &str) -> String {
        self.identity_clause
            .replace("{key}", self.quote(key_column).as_str())
    }
}
