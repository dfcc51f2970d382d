//! Property-based test generators using proptest.
//!
//! Strategies produce predicates over the fixture tables, with fields indexed
//! against the `t × u` combined row.

use expr::{BinaryOp, Expr};
use proptest::prelude::*;
use types::Value;

use crate::fixtures::{joined_col, T_COLUMNS, U_COLUMNS};

/// Strategy for generating random `Value` instances.
///
/// Generates a mix of Int, Text, Bool, and Null values.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z]{1,20}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

/// Comparison operators.
pub fn arb_comparison_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Eq),
        Just(BinaryOp::Ne),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Le),
        Just(BinaryOp::Gt),
        Just(BinaryOp::Ge),
    ]
}

fn arb_column_of(table: &'static str) -> impl Strategy<Value = Expr> {
    let columns: &'static [&'static str] = if table == "t" { &T_COLUMNS } else { &U_COLUMNS };
    prop::sample::select(columns).prop_map(move |c| joined_col(table, c))
}

/// `table.column <op> literal`, with small literals so predicates hit the
/// fixture rows.
pub fn arb_single_table_conjunct(table: &'static str) -> impl Strategy<Value = Expr> {
    (arb_column_of(table), arb_comparison_op(), 0i64..5000)
        .prop_map(|(col, op, v)| Expr::binary(col, op, Expr::literal(v)))
}

/// `t.x <op> u.y`, a conjunct that references both tables.
pub fn arb_cross_table_conjunct() -> impl Strategy<Value = Expr> {
    (arb_column_of("t"), arb_comparison_op(), arb_column_of("u"))
        .prop_map(|(l, op, r)| Expr::binary(l, op, r))
}

/// A non-empty mix of single-table and cross-table conjuncts.
pub fn arb_conjuncts() -> impl Strategy<Value = Vec<Expr>> {
    prop::collection::vec(
        prop_oneof![
            arb_single_table_conjunct("t"),
            arb_single_table_conjunct("u"),
            arb_cross_table_conjunct(),
        ],
        1..6,
    )
}
