//! Base tables and the optional pushdown capabilities they may advertise.

use crate::RowIter;
use catalog::IndexLookup;
use common::{DbResult, ExecutionContext, Schema};
use expr::Expr;
use std::{fmt, sync::Arc};

/// A base table the plan reads rows from.
///
/// Capabilities are opt-in: a table returns `Some` from the matching `as_*`
/// accessor for each kind of pushdown it can take. `Display` should describe
/// everything pushed into the table, since resolved table nodes compare by it.
pub trait Table: fmt::Debug + fmt::Display + Send + Sync {
    fn name(&self) -> &str;

    /// Row shape the table currently produces.
    fn schema(&self) -> Schema;

    fn row_iter(&self, ctx: &ExecutionContext) -> DbResult<Box<dyn RowIter>>;

    fn as_filtered(&self) -> Option<&dyn FilteredTable> {
        None
    }

    fn as_projected(&self) -> Option<&dyn ProjectedTable> {
        None
    }

    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        None
    }
}

/// A table that can evaluate some filters itself.
pub trait FilteredTable {
    /// Subset of `filters` the table is able to evaluate.
    fn handled_filters(&self, filters: &[Expr]) -> Vec<Expr>;

    /// New table bound to exactly `filters`. Field indexes in the filters
    /// refer to the table's own schema.
    fn with_filters(&self, filters: Vec<Expr>) -> DbResult<Arc<dyn Table>>;
}

/// A table that can restrict the columns it materializes.
pub trait ProjectedTable {
    fn with_projection(&self, columns: &[String]) -> DbResult<Arc<dyn Table>>;
}

/// A table that can use an index lookup to restrict its scan.
pub trait IndexableTable {
    fn with_index_lookup(&self, lookup: IndexLookup) -> DbResult<Arc<dyn Table>>;
}

/// Plan leaf wrapping a bound table.
#[derive(Clone, Debug)]
pub struct ResolvedTable {
    table: Arc<dyn Table>,
}

impl ResolvedTable {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self { table }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.table
    }

    pub fn schema(&self) -> Schema {
        self.table.schema()
    }
}

impl PartialEq for ResolvedTable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
            || (self.name() == other.name()
                && self.schema() == other.schema()
                && self.table.to_string() == other.table.to_string())
    }
}
