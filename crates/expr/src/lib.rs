//! Expression model shared by the plan tree and the analyzer.
//!
//! Expressions are immutable trees. Column references reach the data through
//! [`GetField`], which carries the source table tag, the column name and the
//! position of the column inside the row it is evaluated against. That
//! position is only meaningful for one particular row shape: whenever the
//! shape produced below an expression changes, the expression must be fixed
//! up before it is evaluated again.


mod conjunction;

pub use conjunction::{join_and, split_conjunction};

use common::{Column, DbError, DbResult, Row};
use std::fmt;
use types::{SqlType, Value};

/// Binary comparison and logical operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Comparison with its operands swapped: `1 < a` is `a > 1`.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        f.write_str(s)
    }
}

/// Unary operators (currently just logical NOT).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
}

/// Reference to a column of a row, resolved to a position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GetField {
    pub index: usize,
    pub ty: SqlType,
    pub table: String,
    pub name: String,
    pub nullable: bool,
}

impl GetField {
    pub fn new(
        index: usize,
        ty: SqlType,
        table: impl Into<String>,
        name: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Self {
            index,
            ty,
            table: table.into(),
            name: name.into(),
            nullable,
        }
    }

    /// Same reference, pointing at another position.
    pub fn with_index(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }
}

/// Expression abstract syntax tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    GetField(GetField),
    /// Column reference that name resolution has not bound yet.
    ///
    /// Examples:
    /// - `UnresolvedColumn { table: None, name: "id" }` - unqualified column
    /// - `UnresolvedColumn { table: Some("users"), name: "id" }` - qualified column
    UnresolvedColumn {
        table: Option<String>,
        name: String,
    },
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn field(
        index: usize,
        ty: SqlType,
        table: impl Into<String>,
        name: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Expr::GetField(GetField::new(index, ty, table, name, nullable))
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    pub fn alias(expr: Expr, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(expr),
            name: name.into(),
        }
    }

    /// Direct sub-expressions, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::GetField(_) | Expr::UnresolvedColumn { .. } => vec![],
            Expr::Alias { expr, .. } | Expr::Unary { expr, .. } => vec![expr],
            Expr::Binary { left, right, .. } => vec![left, right],
        }
    }

    /// True once no unresolved column remains anywhere in the tree.
    pub fn resolved(&self) -> bool {
        match self {
            Expr::UnresolvedColumn { .. } => false,
            other => other.children().into_iter().all(Expr::resolved),
        }
    }

    /// Rebuilds the expression bottom-up: children first, then `f` on the
    /// node rebuilt around the transformed children.
    pub fn transform_up<F>(self, f: &mut F) -> DbResult<Expr>
    where
        F: FnMut(Expr) -> DbResult<Expr>,
    {
        let rebuilt = match self {
            leaf @ (Expr::Literal(_) | Expr::GetField(_) | Expr::UnresolvedColumn { .. }) => leaf,
            Expr::Alias { expr, name } => Expr::Alias {
                expr: Box::new(expr.transform_up(f)?),
                name,
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: Box::new(expr.transform_up(f)?),
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.transform_up(f)?),
                op,
                right: Box::new(right.transform_up(f)?),
            },
        };
        f(rebuilt)
    }

    /// Pre-order walk. Returning `false` from `f` skips that node's children.
    pub fn inspect<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr) -> bool,
    {
        if f(self) {
            for child in self.children() {
                child.inspect(f);
            }
        }
    }

    /// Every field reference, in pre-order.
    pub fn fields(&self) -> Vec<&GetField> {
        fn collect<'a>(e: &'a Expr, out: &mut Vec<&'a GetField>) {
            if let Expr::GetField(gf) = e {
                out.push(gf);
            }
            for child in e.children() {
                collect(child, out);
            }
        }
        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Distinct table tags referenced by field references, first occurrence
    /// first.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for field in self.fields() {
            if !tables.contains(&field.table.as_str()) {
                tables.push(&field.table);
            }
        }
        tables
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            Expr::Literal(v) => v.sql_type(),
            Expr::GetField(gf) => gf.ty.clone(),
            Expr::UnresolvedColumn { .. } => SqlType::Null,
            Expr::Alias { expr, .. } => expr.sql_type(),
            Expr::Unary { .. } | Expr::Binary { .. } => SqlType::Bool,
        }
    }

    /// Column descriptor for this expression when it is projected.
    pub fn to_column(&self) -> Column {
        match self {
            Expr::GetField(gf) => Column {
                name: gf.name.clone(),
                source: gf.table.clone(),
                ty: gf.ty.clone(),
                nullable: gf.nullable,
            },
            Expr::Alias { expr, name } => Column::new(name.clone(), "", expr.sql_type()),
            other => Column::new(other.to_string(), "", other.sql_type()),
        }
    }

    /// Evaluate the expression over a row whose shape matches the field
    /// indexes of this expression.
    pub fn eval(&self, row: &Row) -> DbResult<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::GetField(gf) => row.values.get(gf.index).cloned().ok_or_else(|| {
                DbError::Executor(format!(
                    "column index {} for {}.{} out of bounds (row has {} columns)",
                    gf.index,
                    gf.table,
                    gf.name,
                    row.values.len()
                ))
            }),
            Expr::UnresolvedColumn { name, .. } => Err(DbError::Planner(format!(
                "cannot evaluate unresolved column '{name}'"
            ))),
            Expr::Alias { expr, .. } => expr.eval(row),
            Expr::Unary { op, expr } => eval_unary_op(*op, expr.eval(row)?),
            Expr::Binary { left, op, right } => {
                let lv = left.eval(row)?;
                let rv = right.eval(row)?;
                eval_binary_op(lv, *op, rv)
            }
        }
    }

    fn fmt_operand(&self, parent: BinaryOp, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, .. } if op.precedence() < parent.precedence() => {
                write!(f, "({self})")
            }
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::GetField(gf) if gf.table.is_empty() => f.write_str(&gf.name),
            Expr::GetField(gf) => write!(f, "{}.{}", gf.table, gf.name),
            Expr::UnresolvedColumn {
                table: Some(table),
                name,
            } => write!(f, "{table}.{name}"),
            Expr::UnresolvedColumn { table: None, name } => f.write_str(name),
            Expr::Alias { expr, name } => write!(f, "{expr} AS {name}"),
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => match expr.as_ref() {
                Expr::Binary { .. } => write!(f, "NOT ({expr})"),
                _ => write!(f, "NOT {expr}"),
            },
            Expr::Binary { left, op, right } => {
                left.fmt_operand(*op, f)?;
                write!(f, " {op} ")?;
                right.fmt_operand(*op, f)
            }
        }
    }
}

fn eval_unary_op(op: UnaryOp, val: Value) -> DbResult<Value> {
    match (op, val) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, val) => Err(DbError::Executor(format!(
            "NOT requires boolean, got {val:?}"
        ))),
    }
}

fn logical_operand(v: &Value, op: BinaryOp) -> DbResult<Option<bool>> {
    match v {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(DbError::Executor(format!(
            "{op} expects bools, got {other:?}"
        ))),
    }
}

fn eval_binary_op(left: Value, op: BinaryOp, right: Value) -> DbResult<Value> {
    if let BinaryOp::And | BinaryOp::Or = op {
        let l = logical_operand(&left, op)?;
        let r = logical_operand(&right, op)?;
        // Three-valued logic: a decisive operand wins over NULL.
        let result = match (op, l, r) {
            (BinaryOp::And, Some(false), _) | (BinaryOp::And, _, Some(false)) => Some(false),
            (BinaryOp::And, Some(true), Some(true)) => Some(true),
            (BinaryOp::Or, Some(true), _) | (BinaryOp::Or, _, Some(true)) => Some(true),
            (BinaryOp::Or, Some(false), Some(false)) => Some(false),
            _ => None,
        };
        return Ok(result.map_or(Value::Null, Value::Bool));
    }

    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let ord = left.cmp_same_type(&right).ok_or_else(|| {
        DbError::Executor(format!(
            "invalid binary operation: {left:?} {op} {right:?}"
        ))
    })?;
    compare(ord, op).map(Value::Bool)
}

fn compare(ord: std::cmp::Ordering, op: BinaryOp) -> DbResult<bool> {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Eq => Ok(ord == Ordering::Equal),
        BinaryOp::Ne => Ok(ord != Ordering::Equal),
        BinaryOp::Lt => Ok(ord == Ordering::Less),
        BinaryOp::Le => Ok(ord != Ordering::Greater),
        BinaryOp::Gt => Ok(ord == Ordering::Greater),
        BinaryOp::Ge => Ok(ord != Ordering::Less),
        BinaryOp::And | BinaryOp::Or => Err(DbError::Executor(format!(
            "{op} is not a comparison"
        ))),
    }
}
