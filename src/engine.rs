use crate::ast;
use crate::builder::Builder;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::executor;
use crate::ir::{ExecResult, QueryResult};
use crate::parser;
use crate::storage::Database;
use crate::types::{ColumnAffinity, Value};
use async_trait::async_trait;
use sqllogictest::{DBOutput, DefaultColumnType};
use std::collections::HashMap;
use tracing::debug;

const NAMED_PREFIXES: [char; 3] = ['@', ':', '$'];

/// Values bound to a statement's parameters.
///
/// Named parameters are found whether or not the caller included the sigil:
/// a value stored as `"year"` answers `@year`, `:year` and `$year`, and one
/// stored as `"@year"` also answers `:year`. Positional values answer `?` in
/// order and `?N` by one-based index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    named: HashMap<String, Value>,
    positional: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_positional(mut self, value: impl Into<Value>) -> Self {
        self.push(value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.named.insert(name.into(), value.into());
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn named(&self, token: &str) -> Option<&Value> {
        if let Some(value) = self.named.get(token) {
            return Some(value);
        }
        let bare = token.trim_start_matches(NAMED_PREFIXES);
        self.named.get(bare).or_else(|| {
            NAMED_PREFIXES
                .iter()
                .find_map(|prefix| self.named.get(&format!("{}{}", prefix, bare)))
        })
    }

    /// Zero-based positional value.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}

/// An in-memory database session.
#[derive(Debug, Default)]
pub struct AffinityDb {
    db: Database,
    config: EngineConfig,
}

impl AffinityDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            db: Database::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn execute(&mut self, sql: &str) -> Result<ExecResult> {
        self.execute_with(sql, &Params::new())
    }

    pub fn execute_with(&mut self, sql: &str, params: &Params) -> Result<ExecResult> {
        let stmt = match parser::parse_statement(sql) {
            Ok(stmt) => stmt,
            Err(err) => {
                debug!(sql, error = %err, "statement failed to parse");
                return Err(err);
            }
        };
        let result = self.dispatch(&stmt, params);
        match &result {
            Ok(outcome) => debug!(
                statement = stmt.kind(),
                rows = outcome.records_affected(),
                "statement complete"
            ),
            Err(err) => debug!(
                statement = stmt.kind(),
                sql,
                error = %err,
                kind = ?err.kind(),
                "statement failed"
            ),
        }
        result
    }

    /// Run a statement that must produce rows.
    pub fn query(&mut self, sql: &str, params: &Params) -> Result<QueryResult> {
        self.execute_with(sql, params)?
            .into_query()
            .ok_or_else(|| Error::unsupported(format!("not a query: {}", sql.trim())))
    }

    fn dispatch(&mut self, stmt: &ast::Statement, params: &Params) -> Result<ExecResult> {
        let built = Builder::new(&mut self.db, params, &self.config).build(stmt)?;
        match built {
            Some(stmt) => executor::execute(&mut self.db, &stmt, &self.config),
            None => Ok(ExecResult::Affected(0)),
        }
    }

    pub fn run_statement(&mut self, sql: &str) -> Result<DBOutput<DefaultColumnType>> {
        match self.execute(sql)? {
            ExecResult::Affected(count) => Ok(DBOutput::StatementComplete(count as u64)),
            ExecResult::Query(result) => {
                let types = result
                    .schema
                    .iter()
                    .map(|column| match column.affinity {
                        Some(ColumnAffinity::Integer) => DefaultColumnType::Integer,
                        Some(ColumnAffinity::Real) => DefaultColumnType::FloatingPoint,
                        _ => DefaultColumnType::Text,
                    })
                    .collect();
                Ok(DBOutput::Rows {
                    types,
                    rows: format_query_rows(result.data),
                })
            }
        }
    }
}

#[async_trait]
impl sqllogictest::AsyncDB for AffinityDb {
    type Error = Error;
    type ColumnType = DefaultColumnType;

    async fn run(&mut self, sql: &str) -> Result<DBOutput<Self::ColumnType>, Self::Error> {
        self.run_statement(sql)
    }

    async fn shutdown(&mut self) {}
}

/// Render rows the way sqllogictest scripts spell values.
pub fn format_query_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|row| row.iter().map(format_cell).collect())
        .collect()
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Real(v) => format!("{:.3}", v),
        Value::Text(text) if text.is_empty() => "(empty)".to_string(),
        other => other.render(),
    }
}
