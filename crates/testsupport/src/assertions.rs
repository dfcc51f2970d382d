//! Custom assertion helpers for testing.
//!
//! Provides plan inspection helpers and assertions for common pushdown
//! testing patterns.

use catalog::Catalog;
use common::{DbResult, ExecutionContext, Row};
use expr::Expr;
use plan::{Node, ResolvedTable};

/// Number of filter nodes anywhere in the tree.
pub fn count_filters(node: &Node) -> usize {
    let mut count = 0;
    node.inspect(&mut |n| {
        if matches!(n, Node::Filter { .. }) {
            count += 1;
        }
        true
    });
    count
}

/// Every filter predicate in the tree, in pre-order.
pub fn filter_predicates(node: &Node) -> Vec<Expr> {
    let mut out = Vec::new();
    node.inspect(&mut |n| {
        if let Node::Filter { predicate, .. } = n {
            out.push(predicate.clone());
        }
        true
    });
    out
}

/// First resolved table named `name`.
pub fn find_table<'a>(node: &'a Node, name: &str) -> Option<&'a ResolvedTable> {
    if let Node::ResolvedTable(t) = node {
        if t.name() == name {
            return Some(t);
        }
    }
    node.children()
        .into_iter()
        .find_map(|child| find_table(child, name))
}

/// Rendered description of the resolved table named `name`.
///
/// # Panics
///
/// Panics if the tree has no such table.
pub fn table_description(node: &Node, name: &str) -> String {
    find_table(node, name)
        .unwrap_or_else(|| panic!("plan has no table '{name}':\n{node}"))
        .table()
        .to_string()
}

/// Assert that the plan contains no filter nodes.
pub fn assert_no_filters(node: &Node) {
    assert_eq!(
        count_filters(node),
        0,
        "expected no filter nodes in plan:\n{node}"
    );
}

/// Assert that no index handle is still checked out of the catalog.
pub fn assert_all_released(catalog: &Catalog) {
    assert_eq!(
        catalog.handles_in_use(),
        0,
        "expected every index handle to be released"
    );
}

/// Assert that an operation returns an error containing a specific substring.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let result: Result<(), common::DbError> = Err(common::DbError::Table("offline".into()));
/// assert_error_contains(result, "offline");
/// ```
pub fn assert_error_contains<T>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(_) => panic!("expected error containing '{expected_msg}', got Ok"),
        Err(err) => {
            let msg = err.to_string();
            assert!(
                msg.contains(expected_msg),
                "expected error containing '{expected_msg}', got '{msg}'"
            );
        }
    }
}

/// Run a plan to completion.
///
/// # Panics
///
/// Panics if execution fails.
pub fn run(node: &Node) -> Vec<Row> {
    plan::collect_rows(node, &ExecutionContext::default()).expect("plan executes")
}

/// Rows of a plan, sorted, for order-insensitive comparisons.
pub fn sorted_rows(node: &Node) -> Vec<Row> {
    let mut rows = run(node);
    rows.sort_by(|a, b| {
        a.values
            .iter()
            .zip(&b.values)
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}
