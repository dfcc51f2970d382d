//! Index assignment: which index lookup each table should scan with, and the
//! catalog handles that back those lookups.

use std::{ops::Bound, sync::Arc};

use catalog::{Catalog, IndexHandle, IndexLookup, IndexMeta, LookupPredicate};
use common::DbResult;
use expr::{BinaryOp, Expr, GetField};
use plan::Node;
use tracing::debug;
use types::Value;

use crate::{Map, TableFilters};

/// Lookup proposed for one table.
#[derive(Debug)]
pub struct TableIndex {
    pub lookup: IndexLookup,
    pub handles: Vec<IndexHandle>,
}

/// Lookups proposed per table tag.
///
/// Every handle inside must eventually go back to the catalog it came from.
#[derive(Debug, Default)]
pub struct IndexAssignment {
    by_table: Map<String, TableIndex>,
}

impl IndexAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, lookup: IndexLookup, handles: Vec<IndexHandle>) {
        self.by_table
            .insert(table.into(), TableIndex { lookup, handles });
    }

    pub fn get(&self, table: &str) -> Option<&TableIndex> {
        self.by_table.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.by_table.contains_key(table)
    }

    pub fn take(&mut self, table: &str) -> Option<TableIndex> {
        self.by_table.remove(table)
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }

    /// Every handle still held, consuming the assignment.
    pub fn into_handles(self) -> Vec<IndexHandle> {
        self.by_table
            .into_values()
            .flat_map(|entry| entry.handles)
            .collect()
    }
}

/// Chooses index lookups for a plan.
///
/// Handles in the returned assignment must be retained from the catalog the
/// analyzer releases into. On error an assigner releases whatever it retained
/// itself.
pub trait IndexAssigner: Send + Sync {
    fn assign(&self, node: &Node) -> DbResult<IndexAssignment>;
}

/// Proposes single-column lookups from `field <op> literal` conjuncts.
///
/// Equality works on any index kind. Ranges need an ordered index. The first
/// usable conjunct for a table, outermost filter first, wins. Conjuncts only
/// reach the tables [`TableFilters::collect`] hands them to.
#[derive(Clone, Debug)]
pub struct CatalogIndexAssigner {
    catalog: Arc<Catalog>,
}

impl CatalogIndexAssigner {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    fn candidates(&self, node: &Node) -> Vec<(String, IndexLookup)> {
        let filters = TableFilters::collect(node);
        filters
            .tables()
            .into_iter()
            .filter_map(|table| {
                let lookup = filters
                    .for_table(table)
                    .iter()
                    .find_map(|conjunct| self.lookup_for(conjunct))?;
                Some((table.to_string(), lookup))
            })
            .collect()
    }

    fn lookup_for(&self, conjunct: &Expr) -> Option<IndexLookup> {
        let (field, op, value) = extract_comparison(conjunct)?;
        let meta = self.catalog.index_for_column(&field.table, &field.name)?;
        let predicate = lookup_predicate(meta, op, value)?;
        Some(IndexLookup {
            index: meta.id,
            index_name: meta.name.clone(),
            table: field.table.clone(),
            column: field.name.clone(),
            predicate,
        })
    }
}

impl IndexAssigner for CatalogIndexAssigner {
    fn assign(&self, node: &Node) -> DbResult<IndexAssignment> {
        let mut assignment = IndexAssignment::new();
        for (table, lookup) in self.candidates(node) {
            let handle = match self.catalog.retain_index(lookup.index) {
                Ok(handle) => handle,
                Err(err) => {
                    for handle in assignment.into_handles() {
                        self.catalog.release_index(handle);
                    }
                    return Err(err);
                }
            };
            debug!(table = %table, lookup = %lookup, "index lookup proposed");
            assignment.insert(table, lookup, vec![handle]);
        }
        Ok(assignment)
    }
}

/// `field <op> literal`, or the mirrored `literal <op> field` with the
/// operator flipped.
fn extract_comparison(expr: &Expr) -> Option<(&GetField, BinaryOp, &Value)> {
    let Expr::Binary { left, op, right } = expr else {
        return None;
    };
    if !op.is_comparison() {
        return None;
    }
    match (left.as_ref(), right.as_ref()) {
        (Expr::GetField(gf), Expr::Literal(v)) => Some((gf, *op, v)),
        (Expr::Literal(v), Expr::GetField(gf)) => Some((gf, op.flip(), v)),
        _ => None,
    }
}

fn lookup_predicate(meta: &IndexMeta, op: BinaryOp, value: &Value) -> Option<LookupPredicate> {
    if value.is_null() {
        return None;
    }
    let v = value.clone();
    let range = |low, high| {
        meta.kind
            .supports_range()
            .then_some(LookupPredicate::Range { low, high })
    };
    match op {
        BinaryOp::Eq => Some(LookupPredicate::Eq(v)),
        BinaryOp::Lt => range(Bound::Unbounded, Bound::Excluded(v)),
        BinaryOp::Le => range(Bound::Unbounded, Bound::Included(v)),
        BinaryOp::Gt => range(Bound::Excluded(v), Bound::Unbounded),
        BinaryOp::Ge => range(Bound::Included(v), Bound::Unbounded),
        _ => None,
    }
}
