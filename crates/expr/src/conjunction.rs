use crate::{BinaryOp, Expr};

/// Splits a conjunction into its conjuncts.
///
/// `a AND (b AND c)` → `[a, b, c]`. OR and every other expression are kept as
/// a single item.
pub fn split_conjunction(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut parts = split_conjunction(left);
            parts.extend(split_conjunction(right));
            parts
        }
        other => vec![other.clone()],
    }
}

/// Joins expressions with AND, left-deep. `None` for an empty list.
pub fn join_and(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(Expr::and)
}
