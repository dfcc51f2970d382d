//! The pushdown pass: moves filters, projections and index lookups into the
//! tables that can take them, and keeps field indexes valid afterwards.

use std::sync::Arc;

use catalog::{Catalog, IndexHandle};
use common::{Config, DbResult, Schema};
use expr::{Expr, join_and, split_conjunction};
use plan::{Node, ReleaseGuard, Releaser, ResolvedTable, Table};
use tracing::{debug, debug_span};

use crate::{
    ColumnUsage, IndexAssigner, IndexAssignment, TableFilters,
    filters::unhandled_filters,
    fixup::{fix_field_indexes, fix_field_indexes_any, fix_field_indexes_on_expressions},
};

pub(crate) fn pushdown(
    catalog: &Arc<Catalog>,
    config: &Config,
    assigner: &dyn IndexAssigner,
    node: Node,
) -> DbResult<Node> {
    let span = debug_span!("pushdown");
    let _g = span.enter();

    if !config.pushdown_enabled {
        debug!("pushdown disabled, leaving plan untouched");
        return Ok(node);
    }
    if !node.resolved() {
        debug!("plan is not resolved, skipping pushdown");
        return Ok(node);
    }

    let usage = {
        let _g = debug_span!("find_pushdown_columns").entered();
        let usage = ColumnUsage::collect(&node);
        debug!(tables = usage.table_count(), "collected used columns");
        usage
    };

    let filters = {
        let _g = debug_span!("find_pushdown_filters").entered();
        let filters = TableFilters::collect(&node);
        debug!(tables = filters.table_count(), "collected pushdown filters");
        filters
    };

    let assignment = if config.index_pushdown {
        let _g = debug_span!("assign_indexes").entered();
        let assignment = assigner.assign(&node)?;
        debug!(tables = assignment.len(), "assigned indexes");
        assignment
    } else {
        IndexAssignment::new()
    };

    let mut pass = Pass {
        config,
        usage: &usage,
        filters: &filters,
        assignment,
        handled: Vec::new(),
        used: Vec::new(),
    };
    let result = node.transform_up(&mut |n| pass.transform(n));

    let Pass { assignment, used, .. } = pass;
    let unused = assignment.into_handles();
    if !unused.is_empty() {
        debug!(handles = unused.len(), "releasing indexes no table took");
    }
    release_all(catalog, unused);

    let node = match result {
        Ok(node) => node,
        Err(err) => {
            debug!(error = %err, handles = used.len(), "pushdown failed, releasing indexes");
            release_all(catalog, used);
            return Err(err);
        }
    };

    if used.is_empty() {
        return Ok(node);
    }
    debug!(handles = used.len(), "wrapping plan in releaser");
    let catalog = Arc::clone(catalog);
    let guard = ReleaseGuard::new(move || release_all(&catalog, used));
    Ok(Node::Releaser(Releaser::new(node, guard)))
}

fn release_all(catalog: &Catalog, handles: Vec<IndexHandle>) {
    for handle in handles {
        catalog.release_index(handle);
    }
}

/// State shared by every node of one bottom-up rewrite.
struct Pass<'a> {
    config: &'a Config,
    usage: &'a ColumnUsage,
    filters: &'a TableFilters,
    assignment: IndexAssignment,
    /// Conjuncts some table took over, across all tables rewritten so far.
    handled: Vec<Expr>,
    /// Handles backing installed lookups.
    used: Vec<IndexHandle>,
}

impl Pass<'_> {
    fn transform(&mut self, node: Node) -> DbResult<Node> {
        match node {
            Node::Filter { predicate, child } => self.transform_filter(predicate, *child),
            Node::ResolvedTable(table) => self.transform_table(table),
            Node::InnerJoin { left, right, cond } => {
                let schema = left.schema().join(&right.schema());
                let cond = fix_field_indexes(&schema, cond)?;
                Ok(Node::InnerJoin { left, right, cond })
            }
            other => fix_against_children(other),
        }
    }

    fn transform_filter(&self, predicate: Expr, child: Node) -> DbResult<Node> {
        let predicate = if self.handled.is_empty() {
            debug!("no handled filters, leaving filter untouched");
            predicate
        } else {
            let conjuncts = split_conjunction(&predicate);
            let total = conjuncts.len();
            let unhandled = unhandled_filters(conjuncts, &self.handled);
            if unhandled.len() == total {
                predicate
            } else {
                let remaining = unhandled.len();
                match join_and(unhandled) {
                    None => {
                        debug!("filter fully handled, removing filter node");
                        return Ok(child);
                    }
                    Some(rest) => {
                        debug!(removed = total - remaining, remaining, "filter narrowed");
                        rest
                    }
                }
            }
        };
        let predicate = fix_field_indexes(&child.schema(), predicate)?;
        Ok(Node::filter(predicate, child))
    }

    fn transform_table(&mut self, node: ResolvedTable) -> DbResult<Node> {
        let name = node.name().to_string();
        let mut table = Arc::clone(node.table());

        if self.config.filter_pushdown {
            if let Some(next) = self.push_filters(&name, table.as_ref())? {
                table = next;
            }
        }

        if self.config.projection_pushdown {
            if let Some(next) = self.push_projection(&name, table.as_ref())? {
                table = next;
            }
        }

        if let Some(next) = self.push_index(&name, table.as_ref())? {
            table = next;
        }

        Ok(Node::table(table))
    }

    fn push_filters(&mut self, name: &str, table: &dyn Table) -> DbResult<Option<Arc<dyn Table>>> {
        let Some(filtered) = table.as_filtered() else {
            return Ok(None);
        };
        let filters = self.filters;
        let candidates = filters.for_table(name);
        let handled = filtered.handled_filters(candidates);
        self.handled.extend(handled.iter().cloned());
        let count = handled.len();
        let fixed = fix_field_indexes_on_expressions(&table.schema(), handled)?;
        let next = filtered.with_filters(fixed)?;
        debug!(
            table = %name,
            handled = count,
            total = candidates.len(),
            "pushed down filters"
        );
        Ok(Some(next))
    }

    fn push_projection(&self, name: &str, table: &dyn Table) -> DbResult<Option<Arc<dyn Table>>> {
        let (Some(projected), Some(columns)) = (table.as_projected(), self.usage.columns(name))
        else {
            return Ok(None);
        };
        let next = projected.with_projection(columns)?;
        debug!(table = %name, columns = ?columns, "pushed down projection");
        Ok(Some(next))
    }

    fn push_index(&mut self, name: &str, table: &dyn Table) -> DbResult<Option<Arc<dyn Table>>> {
        let Some(indexable) = table.as_indexable() else {
            return Ok(None);
        };
        let Some(entry) = self.assignment.take(name) else {
            return Ok(None);
        };
        self.used.extend(entry.handles);
        let lookup = entry.lookup.to_string();
        let next = indexable.with_index_lookup(entry.lookup)?;
        debug!(table = %name, lookup = %lookup, "pushed down index lookup");
        Ok(Some(next))
    }
}

/// Re-index the node's own expressions against its children's schemas.
fn fix_against_children(node: Node) -> DbResult<Node> {
    if node.expressions().is_empty() {
        return Ok(node);
    }
    let schemas: Vec<Schema> = node.children().into_iter().map(Node::schema).collect();
    if schemas.is_empty() {
        return Ok(node);
    }
    node.transform_expressions(&mut |e| fix_field_indexes_any(&schemas, e))
}
