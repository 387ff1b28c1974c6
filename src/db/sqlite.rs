//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient` trait
//! for SQLite files using sqlx. Files are always opened read-only.

use crate::config::{ConnectionConfig, SQLITE_MEMORY};
use crate::db::{
    Column, ColumnInfo, DatabaseBackend, DatabaseClient, ForeignKey, QueryResult, Row, Schema,
    Table, Value, MAX_ROWS, QUERY_TIMEOUT_SECS,
};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteColumn, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long SQLite waits on a locked database before giving up.
const BUSY_TIMEOUT_SECS: u64 = 5;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens the SQLite database named by the connection config.
    ///
    /// Files must already exist and are opened read-only. `:memory:` opens a
    /// private in-memory database on a single connection.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let path = config.sqlite_path()?;

        let connected = if path == SQLITE_MEMORY {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| WardenError::connection(e.to_string()))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            if !Path::new(path).exists() {
                return Err(WardenError::connection(format!(
                    "Database file not found: {path}"
                )));
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .read_only(true)
                .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options)
                .await
        };
        let pool = connected.map_err(|e| {
            WardenError::connection(format!("Cannot open SQLite database {path}: {e}"))
        })?;

        debug!(path, "Opened SQLite database");
        Ok(Self { pool })
    }

    /// Creates a new SqliteClient from an existing connection pool.
    ///
    /// The pool is used as-is, so callers seeding in-memory databases must keep
    /// it on a single long-lived connection.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetches every user table with columns, primary key and row count.
    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let table_names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WardenError::query(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());

        for table_name in table_names {
            let (columns, primary_key) = self.fetch_columns(&table_name).await?;
            let row_count = self.count_rows(&table_name).await;

            tables.push(Table {
                name: table_name,
                columns,
                primary_key,
                row_count,
            });
        }

        Ok(tables)
    }

    /// Fetches columns and primary key columns for a specific table.
    async fn fetch_columns(&self, table_name: &str) -> Result<(Vec<Column>, Vec<String>)> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table_name));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                WardenError::query(format!("Failed to fetch columns for {table_name}: {e}"))
            })?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut keyed: Vec<(i64, String)> = Vec::new();

        for row in &rows {
            let name: String = row.try_get("name").map_err(pragma_error)?;
            let data_type: String = row.try_get("type").map_err(pragma_error)?;
            let not_null: i64 = row.try_get("notnull").map_err(pragma_error)?;
            let default: Option<String> = row.try_get("dflt_value").map_err(pragma_error)?;
            let pk: i64 = row.try_get("pk").map_err(pragma_error)?;

            if pk > 0 {
                keyed.push((pk, name.clone()));
            }

            columns.push(Column {
                name,
                data_type,
                is_nullable: not_null == 0 && pk == 0,
                default,
            });
        }

        keyed.sort_by_key(|(position, _)| *position);
        let primary_key = keyed.into_iter().map(|(_, name)| name).collect();

        Ok((columns, primary_key))
    }

    /// Counts rows in a table. Failures are logged and reported as unknown.
    async fn count_rows(&self, table_name: &str) -> Option<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
        match sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
        {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(table = table_name, error = %e, "Could not count rows");
                None
            }
        }
    }

    /// Fetches foreign keys declared on every table.
    async fn fetch_foreign_keys(&self, tables: &[Table]) -> Result<Vec<ForeignKey>> {
        let mut foreign_keys = Vec::new();

        for table in tables {
            let sql = format!("PRAGMA foreign_key_list({})", quote_ident(&table.name));
            let rows = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    WardenError::query(format!(
                        "Failed to fetch foreign keys for {}: {e}",
                        table.name
                    ))
                })?;

            // Multi-column keys share an id and arrive ordered by seq.
            let mut current: Option<(i64, ForeignKey)> = None;
            for row in &rows {
                let id: i64 = row.try_get("id").map_err(pragma_error)?;
                let to_table: String = row.try_get("table").map_err(pragma_error)?;
                let from_column: String = row.try_get("from").map_err(pragma_error)?;
                let to_column: Option<String> = row.try_get("to").map_err(pragma_error)?;

                // A NULL target column means the referenced table's primary key.
                let to_column = match to_column {
                    Some(column) => column,
                    None => tables
                        .iter()
                        .find(|t| t.name == to_table)
                        .and_then(|t| t.primary_key.first().cloned())
                        .unwrap_or_default(),
                };

                match current.as_mut() {
                    Some((current_id, fk)) if *current_id == id => {
                        fk.from_columns.push(from_column);
                        fk.to_columns.push(to_column);
                    }
                    _ => {
                        if let Some((_, fk)) = current.take() {
                            foreign_keys.push(fk);
                        }
                        current = Some((
                            id,
                            ForeignKey::new(
                                table.name.clone(),
                                vec![from_column],
                                to_table,
                                vec![to_column],
                            ),
                        ));
                    }
                }
            }
            if let Some((_, fk)) = current {
                foreign_keys.push(fk);
            }
        }

        Ok(foreign_keys)
    }

    /// Column metadata for a statement that produced no rows.
    async fn describe_columns(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).prepare(sql).await {
            Ok(statement) => statement.columns().iter().map(column_info).collect(),
            Err(e) => {
                debug!(error = %e, "Could not describe empty result set");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let tables = self.fetch_tables().await?;
        let foreign_keys = self.fetch_foreign_keys(&tables).await?;

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            WardenError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| WardenError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row.columns().iter().map(column_info).collect(),
            None => self.describe_columns(sql).await,
        };

        let total_rows = result.len();
        let was_truncated = total_rows > MAX_ROWS;

        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            total_rows,
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn column_info(col: &SqliteColumn) -> ColumnInfo {
    ColumnInfo::new(col.name(), col.type_info().name())
}

/// Storage classes a SQLite value can carry at runtime.
enum StorageClass {
    Null,
    Integer,
    Real,
    Blob,
    Text,
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single value using its runtime storage class.
///
/// SQLite columns are loosely typed, so the declared column type says little
/// about what a given cell holds.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => StorageClass::Null,
        Ok(raw) => match raw.type_info().name() {
            "INTEGER" => StorageClass::Integer,
            "REAL" => StorageClass::Real,
            "BLOB" => StorageClass::Blob,
            _ => StorageClass::Text,
        },
        Err(_) => StorageClass::Null,
    };

    match storage {
        StorageClass::Null => Value::Null,
        StorageClass::Integer => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        StorageClass::Real => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        StorageClass::Blob => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        StorageClass::Text => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Quotes an identifier for interpolation into PRAGMA and COUNT statements.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn pragma_error(e: sqlx::Error) -> WardenError {
    WardenError::query(format!("Unexpected PRAGMA output: {e}"))
}

/// Formats a query error, preferring the engine's own message.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        for statement in [
            "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT NOT NULL, budget REAL)",
            "CREATE TABLE employees (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                department_id INTEGER REFERENCES departments(id),
                salary REAL,
                badge BLOB,
                hired_at TEXT DEFAULT 'today'
            )",
            "INSERT INTO departments VALUES (1, 'Engineering', 1000000.0), (2, 'Sales', NULL)",
            "INSERT INTO employees VALUES
                (1, 'Ada', 1, 150000.5, x'0102', '2020-01-01'),
                (2, 'Grace', 1, 140000, NULL, '2021-06-01'),
                (3, 'Linus', 2, NULL, NULL, '2022-03-15')",
        ] {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }

        pool
    }

    async fn seeded_client() -> SqliteClient {
        SqliteClient::from_pool(seeded_pool().await)
    }

    #[tokio::test]
    async fn test_introspect_schema() {
        let client = seeded_client().await;
        let schema = client.introspect_schema().await.unwrap();

        assert_eq!(
            schema
                .tables
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>(),
            vec!["departments", "employees"]
        );

        let employees = schema.table("employees").unwrap();
        assert_eq!(employees.primary_key, vec!["id".to_string()]);
        assert_eq!(employees.row_count, Some(3));
        assert_eq!(employees.columns.len(), 6);

        let name = &employees.columns[1];
        assert_eq!(name.data_type, "TEXT");
        assert!(!name.is_nullable);

        let hired_at = &employees.columns[5];
        assert_eq!(hired_at.default.as_deref(), Some("'today'"));

        assert_eq!(
            schema.foreign_keys,
            vec![ForeignKey::new(
                "employees",
                vec!["department_id".to_string()],
                "departments",
                vec!["id".to_string()],
            )]
        );
    }

    #[tokio::test]
    async fn test_execute_select_converts_storage_classes() {
        let client = seeded_client().await;
        let result = client
            .execute_query("SELECT id, name, salary, badge FROM employees ORDER BY id")
            .await
            .unwrap();

        assert_eq!(result.column_names(), vec!["id", "name", "salary", "badge"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows[0][0], Value::Int(1));
        assert_eq!(result.rows[0][1], Value::String("Ada".to_string()));
        assert_eq!(result.rows[0][2], Value::Float(150000.5));
        assert_eq!(result.rows[0][3], Value::Bytes(vec![1, 2]));
        assert_eq!(result.rows[2][2], Value::Null);
    }

    #[tokio::test]
    async fn test_execute_empty_result_keeps_columns() {
        let client = seeded_client().await;
        let result = client
            .execute_query("SELECT id, name FROM employees WHERE salary > 1e9")
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.column_names(), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_execute_query_with_error() {
        let client = seeded_client().await;
        let error = client
            .execute_query("SELECT salry FROM employees")
            .await
            .unwrap_err();

        assert!(matches!(error, WardenError::Query(_)));
        assert!(error.to_string().contains("salry"));
    }

    #[tokio::test]
    async fn test_connect_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let config = ConnectionConfig::sqlite(path.to_string_lossy());

        let error = SqliteClient::connect(&config).await.unwrap_err();
        assert!(matches!(error, WardenError::Connection(_)));
        assert!(error.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_file_database_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
            .execute(&writer)
            .await
            .unwrap();
        sqlx::query("INSERT INTO items (label) VALUES ('lamp')")
            .execute(&writer)
            .await
            .unwrap();
        writer.close().await;

        let client = SqliteClient::connect(&ConnectionConfig::sqlite(path.to_string_lossy()))
            .await
            .unwrap();

        let result = client.execute_query("SELECT label FROM items").await.unwrap();
        assert_eq!(result.rows, vec![vec![Value::String("lamp".to_string())]]);

        let write = client
            .execute_query("INSERT INTO items (label) VALUES ('desk')")
            .await;
        assert!(write.is_err());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let client = SqliteClient::connect(&ConnectionConfig::sqlite(SQLITE_MEMORY))
            .await
            .unwrap();
        let schema = client.introspect_schema().await.unwrap();
        assert!(schema.tables.is_empty());
        assert_eq!(client.backend(), DatabaseBackend::Sqlite);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
