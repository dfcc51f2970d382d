
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use types::{SqlType, Value};

/// Positional row representation backed by `types::Value`.
/// Examples:
/// - `let row = Row::new(vec![Value::Int(1)]);`
/// - `let row = Row::new(vec![Value::Text("alice".into()), Value::Bool(true)]);`
/// - `let row = Row::new(vec![Value::Int(10), Value::Null]);`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Concatenates two rows, left values first.
    pub fn join(&self, right: &Row) -> Row {
        let mut values = Vec::with_capacity(self.values.len() + right.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(right.values.iter().cloned());
        Row::new(values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Describes one column of a row shape.
///
/// `source` is the table tag the column belongs to. Columns computed by an
/// expression (aliases, arithmetic) carry an empty source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub source: String,
    pub ty: SqlType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, source: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ty,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered sequence of column descriptors a node produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Position of the column matching both `source` and `name`.
    pub fn index_of(&self, source: &str, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name && c.source == source)
    }

    /// Left columns followed by right columns, the shape of a joined row.
    pub fn join(&self, right: &Schema) -> Schema {
        self.columns
            .iter()
            .chain(right.columns.iter())
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.source.is_empty() {
                    c.name.clone()
                } else {
                    format!("{}.{}", c.source, c.name)
                }
            })
            .collect();
        write!(f, "[{}]", cols.join(", "))
    }
}

/// Canonical error type shared across the analyzer subsystems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("unresolved table: {0}")]
    UnresolvedTable(String),
    #[error("field missing: {0}")]
    FieldMissing(String),
    #[error("table: {0}")]
    Table(String),
    #[error("index: {0}")]
    Index(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("plan: {0}")]
    Planner(String),
    #[error("exec: {0}")]
    Executor(String),
}

impl DbError {
    /// True for the signal raised when a field reference has no column in a
    /// candidate schema.
    pub fn is_field_missing(&self) -> bool {
        matches!(self, DbError::FieldMissing(_))
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the pushdown analyzer.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder()
///     .projection_pushdown(false)
///     .build();
/// assert!(config.filter_pushdown);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Master switch for the whole pass.
    #[builder(default = true)]
    pub pushdown_enabled: bool,
    /// Offer filter conjuncts to tables that accept filters.
    #[builder(default = true)]
    pub filter_pushdown: bool,
    /// Restrict tables that accept projections to the columns in use.
    #[builder(default = true)]
    pub projection_pushdown: bool,
    /// Install index lookups proposed by the index assigner.
    #[builder(default = true)]
    pub index_pushdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pushdown_enabled: true,
            filter_pushdown: true,
            projection_pushdown: true,
            index_pushdown: true,
        }
    }
}

/// Per-query state handed to row sequence construction.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    pub query_id: u64,
}

impl ExecutionContext {
    pub fn new(query_id: u64) -> Self {
        Self { query_id }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Column, Config, DbError, DbResult, ExecutionContext, Row, Schema};
    pub use types::{SqlType, Value};
}
