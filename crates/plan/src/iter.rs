//! Row sequences: pull-based, single-pass iterators produced by plan nodes.

use crate::{SortField, SortOrder};
use common::{DbError, DbResult, Row};
use expr::Expr;
use std::cmp::Ordering;
use types::Value;

/// Lazily produced, single-pass sequence of rows.
///
/// `next` returns `Ok(None)` once the sequence is exhausted. Consumers call
/// `close` when they are done, whether or not the sequence was drained.
pub trait RowIter: Send {
    fn next(&mut self) -> DbResult<Option<Row>>;

    fn close(&mut self) -> DbResult<()>;
}

/// Evaluate a predicate: NULL is treated as false (SQL semantics).
pub(crate) fn eval_predicate(predicate: &Expr, row: &Row, what: &str) -> DbResult<bool> {
    match predicate.eval(row)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(DbError::Executor(format!(
            "{what} must evaluate to boolean, got {other:?}"
        ))),
    }
}

/// Sequence over materialized rows.
pub struct RowsIter {
    rows: std::vec::IntoIter<Row>,
}

impl RowsIter {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl RowIter for RowsIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) -> DbResult<()> {
        Ok(())
    }
}

/// Passes through rows where the predicate evaluates to true.
pub(crate) struct FilterIter {
    child: Box<dyn RowIter>,
    predicate: Expr,
}

impl FilterIter {
    pub(crate) fn new(child: Box<dyn RowIter>, predicate: Expr) -> Self {
        Self { child, predicate }
    }
}

impl RowIter for FilterIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        while let Some(row) = self.child.next()? {
            if eval_predicate(&self.predicate, &row, "predicate")? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }
}

/// Evaluates each projection against the child row.
pub(crate) struct ProjectIter {
    child: Box<dyn RowIter>,
    projections: Vec<Expr>,
}

impl ProjectIter {
    pub(crate) fn new(child: Box<dyn RowIter>, projections: Vec<Expr>) -> Self {
        Self { child, projections }
    }
}

impl RowIter for ProjectIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        let Some(row) = self.child.next()? else {
            return Ok(None);
        };
        let values = self
            .projections
            .iter()
            .map(|e| e.eval(&row))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Some(Row::new(values)))
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }
}

/// Nested loop join: materializes the right side on the first pull, then
/// combines every left row with every right row, left columns first.
pub(crate) struct JoinIter {
    left: Box<dyn RowIter>,
    right: Box<dyn RowIter>,
    cond: Option<Expr>,
    right_rows: Option<Vec<Row>>,
    current_left: Option<Row>,
    right_cursor: usize,
}

impl JoinIter {
    pub(crate) fn new(left: Box<dyn RowIter>, right: Box<dyn RowIter>, cond: Option<Expr>) -> Self {
        Self {
            left,
            right,
            cond,
            right_rows: None,
            current_left: None,
            right_cursor: 0,
        }
    }
}

impl RowIter for JoinIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        if self.right_rows.is_none() {
            let mut rows = Vec::new();
            while let Some(row) = self.right.next()? {
                rows.push(row);
            }
            self.right_rows = Some(rows);
            self.current_left = self.left.next()?;
        }

        loop {
            let Some(left) = &self.current_left else {
                return Ok(None);
            };
            let right_rows = self.right_rows.as_deref().unwrap_or_default();

            while self.right_cursor < right_rows.len() {
                let combined = left.join(&right_rows[self.right_cursor]);
                self.right_cursor += 1;
                let keep = match &self.cond {
                    Some(cond) => eval_predicate(cond, &combined, "join condition")?,
                    None => true,
                };
                if keep {
                    return Ok(Some(combined));
                }
            }

            self.current_left = self.left.next()?;
            self.right_cursor = 0;
        }
    }

    fn close(&mut self) -> DbResult<()> {
        self.right_rows = None;
        let left = self.left.close();
        let right = self.right.close();
        left.and(right)
    }
}

/// Blocking sort: consumes the child on the first pull.
pub(crate) struct SortIter {
    child: Box<dyn RowIter>,
    fields: Vec<SortField>,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl SortIter {
    pub(crate) fn new(child: Box<dyn RowIter>, fields: Vec<SortField>) -> Self {
        Self {
            child,
            fields,
            sorted: None,
        }
    }

    fn materialize(&mut self) -> DbResult<Vec<Row>> {
        let mut keyed = Vec::new();
        while let Some(row) = self.child.next()? {
            let keys = self
                .fields
                .iter()
                .map(|f| f.expr.eval(&row))
                .collect::<DbResult<Vec<_>>>()?;
            keyed.push((keys, row));
        }
        let fields = &self.fields;
        keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, fields));
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn compare_keys(a: &[Value], b: &[Value], fields: &[SortField]) -> Ordering {
    for ((va, vb), field) in a.iter().zip(b).zip(fields) {
        let ordering = match field.order {
            SortOrder::Ascending => va.sort_cmp(vb),
            SortOrder::Descending => va.sort_cmp(vb).reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl RowIter for SortIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        if self.sorted.is_none() {
            let rows = self.materialize()?;
            self.sorted = Some(rows.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) -> DbResult<()> {
        self.sorted = None;
        self.child.close()
    }
}

/// Returns at most `limit` rows and stops pulling the child afterwards.
pub(crate) struct LimitIter {
    child: Box<dyn RowIter>,
    remaining: usize,
}

impl LimitIter {
    pub(crate) fn new(child: Box<dyn RowIter>, limit: usize) -> Self {
        Self {
            child,
            remaining: limit,
        }
    }
}

impl RowIter for LimitIter {
    fn next(&mut self) -> DbResult<Option<Row>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.child.next()? {
            Some(row) => {
                self.remaining -= 1;
                Ok(Some(row))
            }
            None => {
                self.remaining = 0;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> DbResult<()> {
        self.child.close()
    }
}
