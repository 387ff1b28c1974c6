//! Statement-shape validation.
//!
//! Parses the candidate with sqlparser in the connected backend's dialect and
//! checks that it is exactly one read-only query. Catches what a keyword scan
//! cannot: stacked statements, and data-modifying bodies hidden inside CTEs,
//! derived tables or set operations.
//!
//! Text sqlparser cannot read is passed through. The dialects lag behind the
//! databases (SQLite `GLOB`, `LIMIT x, y`), and a query that really is broken
//! fails at execution, where it is reported rather than refined.

use async_trait::async_trait;
use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::{Parser, ParserError};
use tracing::debug;

use crate::db::DatabaseBackend;

use super::{QueryValidator, ValidatorVerdict};

/// Validator that inspects the parsed statement tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureValidator {
    backend: DatabaseBackend,
}

impl StructureValidator {
    /// Creates a validator that parses with the dialect of `backend`.
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    /// Checks the shape of `sql`. Only text that parses can be rejected.
    pub fn check(&self, sql: &str) -> ValidatorVerdict {
        let statements = match self.parse(sql) {
            Ok(statements) => statements,
            Err(e) => {
                debug!(backend = %self.backend, error = %e, "Skipping shape check for unparsed SQL");
                return ValidatorVerdict::safe();
            }
        };

        match statements.as_slice() {
            [] => ValidatorVerdict::reject("Empty SQL statement"),
            [statement] => check_statement(statement),
            many => ValidatorVerdict::reject(format!(
                "Expected a single statement, found {}. Only one SELECT query is allowed.",
                many.len()
            )),
        }
    }

    fn parse(&self, sql: &str) -> Result<Vec<Statement>, ParserError> {
        match self.backend {
            DatabaseBackend::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
            DatabaseBackend::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        }
    }
}

#[async_trait]
impl QueryValidator for StructureValidator {
    fn name(&self) -> &'static str {
        "structure"
    }

    async fn validate(&self, sql: &str) -> ValidatorVerdict {
        self.check(sql)
    }
}

fn check_statement(statement: &Statement) -> ValidatorVerdict {
    match statement {
        Statement::Query(query) => match find_mutation_in_query(query) {
            Some(keyword) => ValidatorVerdict::reject(format!(
                "Query embeds a data-modifying {} statement. Only read-only queries are allowed.",
                keyword
            )),
            None => ValidatorVerdict::safe(),
        },
        other => ValidatorVerdict::reject(format!(
            "Found a {} statement. Only read-only queries are allowed.",
            leading_keyword(&other.to_string())
        )),
    }
}

/// Returns the leading keyword of the first data-modifying body in `query`.
fn find_mutation_in_query(query: &Query) -> Option<String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(found) = find_mutation_in_query(&cte.query) {
                return Some(found);
            }
        }
    }

    find_mutation_in_set_expr(&query.body)
}

fn find_mutation_in_set_expr(set_expr: &SetExpr) -> Option<String> {
    match set_expr {
        SetExpr::Select(select) => find_mutation_in_select(select),
        SetExpr::Query(query) => find_mutation_in_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            find_mutation_in_set_expr(left).or_else(|| find_mutation_in_set_expr(right))
        }
        SetExpr::Values(_) | SetExpr::Table(_) => None,
        // INSERT, UPDATE and friends wrapped as query bodies
        other => Some(leading_keyword(&other.to_string())),
    }
}

fn find_mutation_in_select(select: &Select) -> Option<String> {
    select.from.iter().find_map(find_mutation_in_table_with_joins)
}

fn find_mutation_in_table_with_joins(twj: &TableWithJoins) -> Option<String> {
    find_mutation_in_table_factor(&twj.relation).or_else(|| {
        twj.joins
            .iter()
            .find_map(|join| find_mutation_in_table_factor(&join.relation))
    })
}

fn find_mutation_in_table_factor(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Derived { subquery, .. } => find_mutation_in_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => find_mutation_in_table_with_joins(table_with_joins),
        _ => None,
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}
