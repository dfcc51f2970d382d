use crate::Map;
use expr::{Expr, split_conjunction};
use plan::Node;

/// Single-table filter conjuncts grouped by the table they mention.
///
/// Conjuncts that mention no table or several tables are never recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableFilters {
    by_table: Map<String, Vec<Expr>>,
}

impl TableFilters {
    /// Split a predicate into conjuncts and group those naming one table.
    pub fn from_predicate(predicate: &Expr) -> Self {
        let mut filters = Self::default();
        for (table, conjunct) in single_table_conjuncts(predicate) {
            filters.by_table.entry(table).or_default().push(conjunct);
        }
        filters
    }

    /// Filters from every filter node in the tree, recorded only for the
    /// tables they reach without crossing a `Limit`.
    ///
    /// A table's conjuncts appear outermost filter first.
    pub fn collect(node: &Node) -> Self {
        let mut filters = Self::default();
        filters.collect_below(node, &mut Vec::new());
        filters
    }

    fn collect_below(&mut self, node: &Node, pending: &mut Vec<(String, Expr)>) {
        match node {
            Node::ResolvedTable(table) => {
                let name = table.name();
                for (_, conjunct) in pending.iter().filter(|(t, _)| t == name) {
                    self.by_table
                        .entry(name.to_string())
                        .or_default()
                        .push(conjunct.clone());
                }
            }
            Node::Filter { predicate, child } => {
                let mark = pending.len();
                pending.extend(single_table_conjuncts(predicate));
                self.collect_below(child, pending);
                pending.truncate(mark);
            }
            // rows cut by a limit must not be filtered before the cut
            Node::Limit { child, .. } => self.collect_below(child, &mut Vec::new()),
            other => {
                for child in other.children() {
                    self.collect_below(child, pending);
                }
            }
        }
    }

    /// Tables with at least one candidate conjunct, in name order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.by_table.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }

    pub fn merge(&mut self, other: TableFilters) {
        for (table, exprs) in other.by_table {
            self.by_table.entry(table).or_default().extend(exprs);
        }
    }

    /// Candidate conjuncts for `table`; empty if there are none.
    pub fn for_table(&self, table: &str) -> &[Expr] {
        self.by_table.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn table_count(&self) -> usize {
        self.by_table.len()
    }
}

/// Conjuncts not present in `handled`, in their original order.
pub fn unhandled_filters(conjuncts: Vec<Expr>, handled: &[Expr]) -> Vec<Expr> {
    conjuncts
        .into_iter()
        .filter(|c| !handled.contains(c))
        .collect()
}

fn single_table_conjuncts(predicate: &Expr) -> Vec<(String, Expr)> {
    split_conjunction(predicate)
        .into_iter()
        .filter_map(|conjunct| {
            let table = match conjunct.tables().as_slice() {
                [table] => table.to_string(),
                _ => return None,
            };
            Some((table, conjunct))
        })
        .collect()
}
