//! Database schema types for db-warden.
//!
//! Represents the structure of a database: tables, columns, row counts and
//! foreign keys, plus the text rendering handed to query generation.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Represents the complete schema of a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    /// All tables in the schema.
    pub tables: Vec<Table>,

    /// Foreign key relationships between tables.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with the given name, if present.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Formats the schema for inclusion in an LLM prompt.
    ///
    /// Each table lists its columns with declared type and `PK` / `NOT NULL` /
    /// `DEFAULT` annotations, followed by its row count when known.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::from("Database Schema:\n\n");

        for table in &self.tables {
            let _ = writeln!(out, "Table: {}", table.name);
            for column in &table.columns {
                out.push_str(&Self::format_column_line(table, column));
            }
            if let Some(count) = table.row_count {
                let _ = writeln!(out, "  Total rows: {}", count);
            }
            out.push('\n');
        }

        if !self.foreign_keys.is_empty() {
            out.push_str("Foreign Keys:\n");
            for fk in &self.foreign_keys {
                let _ = writeln!(
                    out,
                    "  - {}.{} -> {}.{}",
                    fk.from_table,
                    fk.from_columns.join(", "),
                    fk.to_table,
                    fk.to_columns.join(", ")
                );
            }
        }

        out
    }

    fn format_column_line(table: &Table, column: &Column) -> String {
        let mut annotations = Vec::new();
        if table.primary_key.contains(&column.name) {
            annotations.push("PK".to_string());
        }
        if !column.is_nullable {
            annotations.push("NOT NULL".to_string());
        }
        if let Some(default) = &column.default {
            annotations.push(format!("DEFAULT {}", default));
        }

        let data_type = if column.data_type.is_empty() {
            "ANY"
        } else {
            column.data_type.as_str()
        };

        if annotations.is_empty() {
            format!("  - {}: {}\n", column.name, data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                data_type,
                annotations.join(", ")
            )
        }
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns in the table, in declaration order.
    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,

    /// Number of rows at introspection time, if it could be counted.
    pub row_count: Option<i64>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            row_count: None,
        }
    }

    /// Adds a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Sets the row count.
    pub fn with_row_count(mut self, count: i64) -> Self {
        self.row_count = Some(count);
        self
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared data type (e.g., "INTEGER", "varchar(255)").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a new nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }
}

/// Represents a foreign key relationship between tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    /// Source table name.
    pub from_table: String,

    /// Source column names.
    pub from_columns: Vec<String>,

    /// Target table name.
    pub to_table: String,

    /// Target column names.
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    /// Creates a new foreign key relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema {
            tables: vec![
                Table::new("departments")
                    .with_column(Column::new("id", "INTEGER").nullable(false))
                    .with_column(Column::new("name", "TEXT").nullable(false))
                    .with_column(Column::new("budget", "REAL"))
                    .with_primary_key(&["id"])
                    .with_row_count(5),
                Table::new("employees")
                    .with_column(Column::new("id", "INTEGER").nullable(false))
                    .with_column(Column::new("department_id", "INTEGER"))
                    .with_column(
                        Column::new("hired_at", "TEXT")
                            .nullable(false)
                            .with_default("CURRENT_DATE"),
                    )
                    .with_primary_key(&["id"])
                    .with_row_count(40),
            ],
            foreign_keys: vec![ForeignKey::new(
                "employees",
                vec!["department_id".to_string()],
                "departments",
                vec!["id".to_string()],
            )],
        }
    }

    #[test]
    fn test_schema_format_for_llm() {
        let formatted = sample_schema().format_for_llm();

        assert!(formatted.starts_with("Database Schema:"));
        assert!(formatted.contains("Table: departments"));
        assert!(formatted.contains("  - id: INTEGER (PK, NOT NULL)\n"));
        assert!(formatted.contains("  - budget: REAL\n"));
        assert!(formatted.contains("  - hired_at: TEXT (NOT NULL, DEFAULT CURRENT_DATE)\n"));
        assert!(formatted.contains("  Total rows: 40"));
        assert!(formatted.contains("Foreign Keys:"));
        assert!(formatted.contains("employees.department_id -> departments.id"));
    }

    #[test]
    fn test_untyped_column_renders_as_any() {
        let schema = Schema {
            tables: vec![Table::new("notes").with_column(Column::new("body", ""))],
            foreign_keys: vec![],
        };
        assert!(schema.format_for_llm().contains("  - body: ANY\n"));
    }

    #[test]
    fn test_unknown_row_count_is_omitted() {
        let schema = Schema {
            tables: vec![Table::new("logs").with_column(Column::new("line", "TEXT"))],
            foreign_keys: vec![],
        };
        assert!(!schema.format_for_llm().contains("Total rows"));
    }

    #[test]
    fn test_table_lookup() {
        let schema = sample_schema();
        assert_eq!(schema.table("employees").map(|t| t.columns.len()), Some(3));
        assert!(schema.table("payroll").is_none());
    }

    #[test]
    fn test_column_builder() {
        let col = Column::new("email", "varchar(255)")
            .nullable(false)
            .with_default("''");

        assert_eq!(col.name, "email");
        assert_eq!(col.data_type, "varchar(255)");
        assert!(!col.is_nullable);
        assert_eq!(col.default, Some("''".to_string()));
    }

    #[test]
    fn test_empty_schema() {
        let formatted = Schema::new().format_for_llm();

        assert!(formatted.contains("Database Schema:"));
        assert!(!formatted.contains("Foreign Keys:"));
    }
}
