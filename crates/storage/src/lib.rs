//! In-memory base tables.
//!
//! [`MemoryTable`] holds its rows in shared memory and can opt in to each
//! pushdown capability independently. Pushed filters are evaluated against
//! the full stored row, then the index lookup narrows the scan, and the
//! projection is applied last.


use std::{fmt, sync::Arc};

use catalog::IndexLookup;
use common::{Column, DbError, DbResult, ExecutionContext, Row, Schema};
use expr::Expr;
use plan::{FilteredTable, IndexableTable, ProjectedTable, RowIter, RowsIter, Table};
use types::Value;

/// Which pushdown capabilities a table advertises.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub filters: bool,
    pub projection: bool,
    pub index: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            filters: true,
            projection: true,
            index: true,
        }
    }
}

/// Table backed by a shared, immutable vector of rows.
///
/// Every pushdown returns a new table sharing the same rows.
#[derive(Clone, Debug)]
pub struct MemoryTable {
    name: String,
    schema: Schema,
    rows: Arc<Vec<Row>>,
    capabilities: Capabilities,
    /// When set, only filters whose fields all fall in these columns are handled.
    filter_columns: Option<Vec<String>>,
    filters: Vec<Expr>,
    projection: Option<Vec<String>>,
    lookup: Option<IndexLookup>,
}

impl MemoryTable {
    /// Create an empty table. Columns are tagged with `name` as their source.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let schema = columns
            .into_iter()
            .map(|c| Column {
                source: name.clone(),
                ..c
            })
            .collect();
        Self {
            name,
            schema,
            rows: Arc::new(Vec::new()),
            capabilities: Capabilities::default(),
            filter_columns: None,
            filters: Vec::new(),
            projection: None,
            lookup: None,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = Arc::new(rows);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Restrict filter handling to conjuncts over the given columns.
    pub fn handling_columns(mut self, columns: &[&str]) -> Self {
        self.filter_columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn into_table(self) -> Arc<dyn Table> {
        Arc::new(self)
    }

    /// Schema of the stored rows, before any projection.
    pub fn base_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn lookup(&self) -> Option<&IndexLookup> {
        self.lookup.as_ref()
    }

    fn column_position(&self, name: &str) -> DbResult<usize> {
        self.schema.index_of(&self.name, name).ok_or_else(|| {
            DbError::Table(format!("table '{}' has no column '{name}'", self.name))
        })
    }

    fn can_handle(&self, filter: &Expr) -> bool {
        let fields = filter.fields();
        !fields.is_empty()
            && fields.iter().all(|gf| {
                gf.table == self.name
                    && self.schema.index_of(&self.name, &gf.name).is_some()
                    && self
                        .filter_columns
                        .as_ref()
                        .is_none_or(|cols| cols.contains(&gf.name))
            })
    }

    fn keep(&self, row: &Row, lookup_column: Option<usize>) -> DbResult<bool> {
        for filter in &self.filters {
            match filter.eval(row)? {
                Value::Bool(true) => {}
                Value::Bool(false) | Value::Null => return Ok(false),
                other => {
                    return Err(DbError::Executor(format!(
                        "filter on '{}' must evaluate to boolean, got {other:?}",
                        self.name
                    )));
                }
            }
        }
        if let (Some(lookup), Some(pos)) = (&self.lookup, lookup_column) {
            let value = row.values.get(pos).unwrap_or(&Value::Null);
            if !lookup.predicate.matches(value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn scan(&self) -> DbResult<Vec<Row>> {
        let lookup_column = self
            .lookup
            .as_ref()
            .map(|l| self.column_position(&l.column))
            .transpose()?;
        let projected = self
            .projection
            .as_ref()
            .map(|cols| {
                cols.iter()
                    .map(|c| self.column_position(c))
                    .collect::<DbResult<Vec<_>>>()
            })
            .transpose()?;

        let mut out = Vec::new();
        for row in self.rows.iter() {
            if !self.keep(row, lookup_column)? {
                continue;
            }
            let row = match &projected {
                Some(positions) => Row::new(
                    positions
                        .iter()
                        .map(|&p| row.values.get(p).cloned().unwrap_or(Value::Null))
                        .collect(),
                ),
                None => row.clone(),
            };
            out.push(row);
        }
        Ok(out)
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        match &self.projection {
            Some(cols) => cols
                .iter()
                .filter_map(|c| self.schema.iter().find(|col| &col.name == c).cloned())
                .collect(),
            None => self.schema.clone(),
        }
    }

    fn row_iter(&self, _ctx: &ExecutionContext) -> DbResult<Box<dyn RowIter>> {
        Ok(Box::new(RowsIter::new(self.scan()?)))
    }

    fn as_filtered(&self) -> Option<&dyn FilteredTable> {
        self.capabilities.filters.then_some(self as &dyn FilteredTable)
    }

    fn as_projected(&self) -> Option<&dyn ProjectedTable> {
        self.capabilities
            .projection
            .then_some(self as &dyn ProjectedTable)
    }

    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        self.capabilities.index.then_some(self as &dyn IndexableTable)
    }
}

impl FilteredTable for MemoryTable {
    fn handled_filters(&self, filters: &[Expr]) -> Vec<Expr> {
        filters
            .iter()
            .filter(|f| self.can_handle(f))
            .cloned()
            .collect()
    }

    fn with_filters(&self, filters: Vec<Expr>) -> DbResult<Arc<dyn Table>> {
        for filter in &filters {
            for gf in filter.fields() {
                match self.schema.columns().get(gf.index) {
                    Some(col) if col.name == gf.name && col.source == gf.table => {}
                    _ => {
                        return Err(DbError::Table(format!(
                            "filter field {}.{} at {} does not match table '{}'",
                            gf.table, gf.name, gf.index, self.name
                        )));
                    }
                }
            }
        }
        Ok(Arc::new(Self {
            filters,
            ..self.clone()
        }))
    }
}

impl ProjectedTable for MemoryTable {
    fn with_projection(&self, columns: &[String]) -> DbResult<Arc<dyn Table>> {
        let mut projection: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            self.column_position(column)?;
            if !projection.contains(column) {
                projection.push(column.clone());
            }
        }
        Ok(Arc::new(Self {
            projection: Some(projection),
            ..self.clone()
        }))
    }
}

impl IndexableTable for MemoryTable {
    fn with_index_lookup(&self, lookup: IndexLookup) -> DbResult<Arc<dyn Table>> {
        if lookup.table != self.name {
            return Err(DbError::Index(format!(
                "lookup on '{}' cannot be applied to table '{}'",
                lookup.table, self.name
            )));
        }
        self.column_position(&lookup.column)?;
        Ok(Arc::new(Self {
            lookup: Some(lookup),
            ..self.clone()
        }))
    }
}

impl fmt::Display for MemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
            write!(f, " filters=[{}]", filters.join(", "))?;
        }
        if let Some(cols) = &self.projection {
            write!(f, " projection=[{}]", cols.join(", "))?;
        }
        if let Some(lookup) = &self.lookup {
            write!(f, " lookup={lookup}")?;
        }
        Ok(())
    }
}
