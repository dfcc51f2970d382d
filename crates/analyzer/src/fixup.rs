use common::{DbError, DbResult, Schema};
use expr::Expr;

/// Point every field reference in `expr` at the column of `schema` with the
/// same name and source table.
///
/// Fails with [`DbError::FieldMissing`] if any reference has no such column.
pub fn fix_field_indexes(schema: &Schema, expr: Expr) -> DbResult<Expr> {
    expr.transform_up(&mut |e| match e {
        Expr::GetField(gf) => match schema.index_of(&gf.table, &gf.name) {
            Some(index) => Ok(Expr::GetField(gf.with_index(index))),
            None => Err(DbError::FieldMissing(gf.name.clone())),
        },
        other => Ok(other),
    })
}

pub fn fix_field_indexes_on_expressions(schema: &Schema, exprs: Vec<Expr>) -> DbResult<Vec<Expr>> {
    exprs
        .into_iter()
        .map(|e| fix_field_indexes(schema, e))
        .collect()
}

/// Fix `expr` against the first of `schemas` that resolves every reference.
///
/// A missing field only moves on to the next candidate; running out of
/// candidates returns the last miss. Other errors stop immediately.
pub fn fix_field_indexes_any(schemas: &[Schema], expr: Expr) -> DbResult<Expr> {
    let mut last_miss = DbError::FieldMissing(expr.to_string());
    for schema in schemas {
        match fix_field_indexes(schema, expr.clone()) {
            Ok(fixed) => return Ok(fixed),
            Err(err) if err.is_field_missing() => last_miss = err,
            Err(err) => return Err(err),
        }
    }
    Err(last_miss)
}
