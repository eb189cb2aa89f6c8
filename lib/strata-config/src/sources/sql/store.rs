use std::str::FromStr as _;

use async_trait::async_trait;
use sqlx::{
    any::{AnyConnectOptions, AnyRow},
    AnyConnection, ConnectOptions as _, Connection as _, Row as _,
};
use tracing::debug;

use crate::errors::GenericError;

/// A parameterized query selecting settings keys and values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettingsQuery {
    /// SQL text, using `$1`, `$2`, ... placeholders.
    pub sql: String,

    /// Parameter values, bound in order.
    pub parameters: Vec<String>,
}

impl SettingsQuery {
    /// Builds the query for the given table layout and optional criteria.
    ///
    /// `filter` restricts rows to those whose filter column equals the given value, and `prefix` restricts rows to
    /// those whose key starts with the given value. `%` and `_` in the prefix match themselves rather than acting as
    /// wildcards. Empty criteria are ignored.
    pub fn build(layout: &TableLayout, filter: Option<&str>, prefix: Option<&str>) -> Self {
        let mut sql = format!(
            "SELECT {}, {} FROM {}",
            layout.key_column, layout.value_column, layout.table
        );
        let mut conditions = Vec::new();
        let mut parameters = Vec::new();

        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            parameters.push(filter.to_string());
            conditions.push(format!("{} = ${}", layout.filter_column, parameters.len()));
        }

        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            parameters.push(format!("{}%", escape_like(prefix)));
            conditions.push(format!(
                "{} LIKE ${} ESCAPE '{}'",
                layout.key_column,
                parameters.len(),
                LIKE_ESCAPE
            ));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        Self { sql, parameters }
    }
}

const LIKE_ESCAPE: char = '\\';

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Names of the table and columns holding settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableLayout {
    /// Table name, optionally schema-qualified.
    pub table: String,

    /// Column holding setting keys.
    pub key_column: String,

    /// Column holding setting values.
    pub value_column: String,

    /// Column compared against the configured filter.
    pub filter_column: String,
}

impl TableLayout {
    /// Returns the first name that is not a plain SQL identifier, if any.
    ///
    /// Identifiers cannot be bound as query parameters, so they are restricted to ASCII letters, digits and
    /// underscores, optionally separated by `.`.
    pub fn find_invalid_identifier(&self) -> Option<&str> {
        [&self.table, &self.key_column, &self.value_column, &self.filter_column]
            .into_iter()
            .map(String::as_str)
            .find(|name| !is_identifier(name))
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// A single row of settings data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettingsRow {
    /// Setting key.
    pub key: String,

    /// Setting value, or `None` for a SQL `NULL`.
    pub value: Option<String>,
}

/// An open connection to a settings store.
#[async_trait]
pub trait SettingsConnection: Send {
    /// Runs the query, returning one result per row.
    ///
    /// A row that cannot be read is returned as an error in its slot rather than failing the whole query.
    ///
    /// # Errors
    ///
    /// If the query cannot be executed, an error is returned.
    async fn query(&mut self, query: &SettingsQuery) -> Result<Vec<Result<SettingsRow, GenericError>>, GenericError>;

    /// Closes the connection.
    async fn close(self: Box<Self>);
}

/// Opens connections to a settings store.
#[async_trait]
pub trait SettingsConnector: Send + Sync {
    /// Checks that the connection string is well-formed, without connecting.
    ///
    /// # Errors
    ///
    /// If the connection string cannot be interpreted, an error is returned.
    fn validate(&self, _connection_string: &str) -> Result<(), GenericError> {
        Ok(())
    }

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// If the connection cannot be established, an error is returned.
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn SettingsConnection>, GenericError>;
}

/// A connector for SQL databases supported by `sqlx`'s `Any` driver.
///
/// The driver is selected from the connection string's scheme: `sqlite:` or `postgres:`.
#[derive(Clone, Debug)]
pub struct SqlxSettingsConnector {
    _private: (),
}

impl Default for SqlxSettingsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlxSettingsConnector {
    /// Creates a new `SqlxSettingsConnector`.
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self { _private: () }
    }
}

#[async_trait]
impl SettingsConnector for SqlxSettingsConnector {
    fn validate(&self, connection_string: &str) -> Result<(), GenericError> {
        AnyConnectOptions::from_str(connection_string.trim())?;
        Ok(())
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn SettingsConnection>, GenericError> {
        let options = AnyConnectOptions::from_str(connection_string.trim())?;
        let connection = options.connect().await?;
        Ok(Box::new(SqlxSettingsConnection { connection }))
    }
}

struct SqlxSettingsConnection {
    connection: AnyConnection,
}

#[async_trait]
impl SettingsConnection for SqlxSettingsConnection {
    async fn query(&mut self, query: &SettingsQuery) -> Result<Vec<Result<SettingsRow, GenericError>>, GenericError> {
        let mut statement = sqlx::query(&query.sql);
        for parameter in &query.parameters {
            statement = statement.bind(parameter.clone());
        }

        let rows = statement.fetch_all(&mut self.connection).await?;
        Ok(rows.iter().map(read_row).collect())
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.connection.close().await {
            debug!(error = %e, "Failed to cleanly close settings store connection.");
        }
    }
}

fn read_row(row: &AnyRow) -> Result<SettingsRow, GenericError> {
    let key = row.try_get::<String, _>(0)?;
    let value = row.try_get::<Option<String>, _>(1)?;
    Ok(SettingsRow { key, value })
}
