//! Common test fixtures and builders.
//!
//! Two small tables back most pushdown tests:
//!
//! | table | columns       | rows                                   |
//! |-------|---------------|----------------------------------------|
//! | `t`   | `a`, `b`, `c` | `(1, 10, 100)`, `(2, 20, 200)`, `(3, 30, 300)` |
//! | `u`   | `b`, `d`      | `(10, 1000)`, `(20, 2000)`, `(40, 4000)` |
//!
//! All columns are `INT`. In a `t × u` join the combined row is
//! `[t.a, t.b, t.c, u.b, u.d]`.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use catalog::{Catalog, IndexKind};
use common::{Column, Row};
use expr::{BinaryOp, Expr};
use plan::{Node, ReleaseGuard};
use storage::{Capabilities, MemoryTable};
use types::{SqlType, Value};

pub const T_COLUMNS: [&str; 3] = ["a", "b", "c"];
pub const U_COLUMNS: [&str; 2] = ["b", "d"];

/// Build a row with integer values.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let row = int_row(&[1, 2, 3]);
/// assert_eq!(row.values.len(), 3);
/// ```
pub fn int_row(values: &[i64]) -> Row {
    Row::new(values.iter().map(|&v| Value::Int(v)).collect())
}

fn int_columns(names: &[&str]) -> Vec<Column> {
    names
        .iter()
        .map(|n| Column::new(*n, "", SqlType::Int))
        .collect()
}

/// The `t(a, b, c)` fixture table.
pub fn t_table(capabilities: Capabilities) -> MemoryTable {
    MemoryTable::new("t", int_columns(&T_COLUMNS))
        .with_rows(vec![
            int_row(&[1, 10, 100]),
            int_row(&[2, 20, 200]),
            int_row(&[3, 30, 300]),
        ])
        .with_capabilities(capabilities)
}

/// The `u(b, d)` fixture table.
pub fn u_table(capabilities: Capabilities) -> MemoryTable {
    MemoryTable::new("u", int_columns(&U_COLUMNS))
        .with_rows(vec![
            int_row(&[10, 1000]),
            int_row(&[20, 2000]),
            int_row(&[40, 4000]),
        ])
        .with_capabilities(capabilities)
}

pub fn t_scan(capabilities: Capabilities) -> Node {
    Node::table(t_table(capabilities).into_table())
}

pub fn u_scan(capabilities: Capabilities) -> Node {
    Node::table(u_table(capabilities).into_table())
}

/// `t × u` joined on `t.b = u.b`.
pub fn t_join_u(t: Capabilities, u: Capabilities) -> Node {
    Node::inner_join(
        t_scan(t),
        u_scan(u),
        eq(joined_col("t", "b"), joined_col("u", "b")),
    )
}

/// Catalog with `idx_t_a` (btree on `t.a`), `idx_t_c` (hash on `t.c`) and
/// `idx_u_b` (hash on `u.b`).
pub fn sample_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .create_index("t", "idx_t_a", &["a"], IndexKind::BTree)
        .expect("create idx_t_a");
    catalog
        .create_index("t", "idx_t_c", &["c"], IndexKind::Hash)
        .expect("create idx_t_c");
    catalog
        .create_index("u", "idx_u_b", &["b"], IndexKind::Hash)
        .expect("create idx_u_b");
    catalog
}

// Expression builders for testing

/// Create an `INT` field reference.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let expr = field(0, "t", "a");
/// assert_eq!(expr.to_string(), "t.a");
/// ```
pub fn field(index: usize, table: &str, name: &str) -> Expr {
    Expr::field(index, SqlType::Int, table, name, true)
}

/// Field of `t` indexed against `t`'s own schema.
pub fn t_col(name: &str) -> Expr {
    field(position(&T_COLUMNS, name), "t", name)
}

/// Field of `u` indexed against `u`'s own schema.
pub fn u_col(name: &str) -> Expr {
    field(position(&U_COLUMNS, name), "u", name)
}

/// Field indexed against the `t × u` combined row.
pub fn joined_col(table: &str, name: &str) -> Expr {
    match table {
        "t" => t_col(name),
        "u" => field(T_COLUMNS.len() + position(&U_COLUMNS, name), "u", name),
        other => panic!("no fixture table named '{other}'"),
    }
}

fn position(columns: &[&str], name: &str) -> usize {
    columns
        .iter()
        .position(|c| *c == name)
        .unwrap_or_else(|| panic!("no fixture column named '{name}'"))
}

pub fn lit(value: i64) -> Expr {
    Expr::literal(value)
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    Expr::eq(left, right)
}

pub fn cmp(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::binary(left, op, right)
}

pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::and(left, right)
}

pub fn or(left: Expr, right: Expr) -> Expr {
    Expr::or(left, right)
}

/// Wrap `child` in a filter.
pub fn filter(predicate: Expr, child: Node) -> Node {
    Node::filter(predicate, child)
}

/// Counts how many times release hooks built from it have fired.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// let counter = ReleaseCounter::new();
/// let guard = counter.guard();
/// guard.release();
/// guard.release();
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReleaseCounter {
    fired: Arc<AtomicUsize>,
}

impl ReleaseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A release action that bumps the counter.
    pub fn hook(&self) -> impl FnOnce() + Send + 'static {
        let fired = Arc::clone(&self.fired);
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn guard(&self) -> Arc<ReleaseGuard> {
        ReleaseGuard::new(self.hook())
    }

    pub fn count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}
