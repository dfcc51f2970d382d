//! Logical plan tree: node kinds, bottom-up rewriting and row production.
//!
//! Plans are immutable. Rewrites consume a tree and build a new one, so a
//! subtree always has exactly one owner.
//!
//! # Example
//!
//! ```
//! use plan::Node;
//!
//! let plan = Node::unresolved("users");
//! assert!(!plan.resolved());
//! ```


mod iter;
mod release;
mod table;

pub use iter::{RowIter, RowsIter};
pub use release::{ReleaseGuard, Releaser};
pub use table::{FilteredTable, IndexableTable, ProjectedTable, ResolvedTable, Table};

use common::{DbError, DbResult, ExecutionContext, Row, Schema};
use expr::Expr;
use iter::{FilterIter, JoinIter, LimitIter, ProjectIter, SortIter};
use std::{fmt, sync::Arc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One ORDER BY key.
#[derive(Clone, Debug, PartialEq)]
pub struct SortField {
    pub expr: Expr,
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            order: SortOrder::Descending,
        }
    }
}

/// Logical plan node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    ResolvedTable(ResolvedTable),
    /// Table known only by name. Never executable.
    UnresolvedTable {
        name: String,
    },
    Filter {
        predicate: Expr,
        child: Box<Node>,
    },
    Project {
        projections: Vec<Expr>,
        child: Box<Node>,
    },
    InnerJoin {
        left: Box<Node>,
        right: Box<Node>,
        cond: Expr,
    },
    CrossJoin {
        left: Box<Node>,
        right: Box<Node>,
    },
    Sort {
        fields: Vec<SortField>,
        child: Box<Node>,
    },
    Limit {
        limit: usize,
        child: Box<Node>,
    },
    Releaser(Releaser),
}

impl Node {
    pub fn table(table: Arc<dyn Table>) -> Self {
        Node::ResolvedTable(ResolvedTable::new(table))
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Node::UnresolvedTable { name: name.into() }
    }

    pub fn filter(predicate: Expr, child: Node) -> Self {
        Node::Filter {
            predicate,
            child: Box::new(child),
        }
    }

    pub fn project(projections: Vec<Expr>, child: Node) -> Self {
        Node::Project {
            projections,
            child: Box::new(child),
        }
    }

    pub fn inner_join(left: Node, right: Node, cond: Expr) -> Self {
        Node::InnerJoin {
            left: Box::new(left),
            right: Box::new(right),
            cond,
        }
    }

    pub fn cross_join(left: Node, right: Node) -> Self {
        Node::CrossJoin {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn sort(fields: Vec<SortField>, child: Node) -> Self {
        Node::Sort {
            fields,
            child: Box::new(child),
        }
    }

    pub fn limit(limit: usize, child: Node) -> Self {
        Node::Limit {
            limit,
            child: Box::new(child),
        }
    }

    /// True once no unresolved table or column remains beneath this node.
    pub fn resolved(&self) -> bool {
        match self {
            Node::UnresolvedTable { .. } => false,
            Node::ResolvedTable(_) => true,
            Node::Releaser(r) => r.child.resolved(),
            other => {
                other.children().into_iter().all(Node::resolved)
                    && other.expressions().into_iter().all(Expr::resolved)
            }
        }
    }

    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::ResolvedTable(_) | Node::UnresolvedTable { .. } => vec![],
            Node::Filter { child, .. }
            | Node::Project { child, .. }
            | Node::Sort { child, .. }
            | Node::Limit { child, .. } => vec![child],
            Node::InnerJoin { left, right, .. } | Node::CrossJoin { left, right } => {
                vec![left, right]
            }
            Node::Releaser(r) => vec![&r.child],
        }
    }

    /// Expressions owned by this node itself, not its children.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Node::Filter { predicate, .. } => vec![predicate],
            Node::Project { projections, .. } => projections.iter().collect(),
            Node::InnerJoin { cond, .. } => vec![cond],
            Node::Sort { fields, .. } => fields.iter().map(|f| &f.expr).collect(),
            Node::ResolvedTable(_)
            | Node::UnresolvedTable { .. }
            | Node::CrossJoin { .. }
            | Node::Limit { .. }
            | Node::Releaser(_) => vec![],
        }
    }

    /// Row shape this node produces.
    pub fn schema(&self) -> Schema {
        match self {
            Node::ResolvedTable(t) => t.schema(),
            Node::UnresolvedTable { .. } => Schema::empty(),
            Node::Filter { child, .. } | Node::Sort { child, .. } | Node::Limit { child, .. } => {
                child.schema()
            }
            Node::Project { projections, .. } => projections.iter().map(Expr::to_column).collect(),
            Node::InnerJoin { left, right, .. } | Node::CrossJoin { left, right } => {
                left.schema().join(&right.schema())
            }
            Node::Releaser(r) => r.child.schema(),
        }
    }

    /// Rebuild this node with each child replaced by `f(child)`.
    fn map_children<F>(self, mut f: F) -> DbResult<Node>
    where
        F: FnMut(Node) -> DbResult<Node>,
    {
        let mut boxed = |child: Box<Node>| f(*child).map(Box::new);
        Ok(match self {
            leaf @ (Node::ResolvedTable(_) | Node::UnresolvedTable { .. }) => leaf,
            Node::Filter { predicate, child } => Node::Filter {
                predicate,
                child: boxed(child)?,
            },
            Node::Project { projections, child } => Node::Project {
                projections,
                child: boxed(child)?,
            },
            Node::InnerJoin { left, right, cond } => Node::InnerJoin {
                left: boxed(left)?,
                right: boxed(right)?,
                cond,
            },
            Node::CrossJoin { left, right } => Node::CrossJoin {
                left: boxed(left)?,
                right: boxed(right)?,
            },
            Node::Sort { fields, child } => Node::Sort {
                fields,
                child: boxed(child)?,
            },
            Node::Limit { limit, child } => Node::Limit {
                limit,
                child: boxed(child)?,
            },
            Node::Releaser(Releaser { child, guard }) => Node::Releaser(Releaser {
                child: boxed(child)?,
                guard,
            }),
        })
    }

    /// Bottom-up rewrite: every child is transformed first, the node is
    /// rebuilt around the new children, then `f` runs on the rebuilt node.
    pub fn transform_up<F>(self, f: &mut F) -> DbResult<Node>
    where
        F: FnMut(Node) -> DbResult<Node>,
    {
        let rebuilt = self.map_children(|child| child.transform_up(&mut *f))?;
        f(rebuilt)
    }

    /// Rewrite the expressions this node owns. `f` receives each expression
    /// whole; children are left alone.
    pub fn transform_expressions<F>(self, f: &mut F) -> DbResult<Node>
    where
        F: FnMut(Expr) -> DbResult<Expr>,
    {
        Ok(match self {
            Node::Filter { predicate, child } => Node::Filter {
                predicate: f(predicate)?,
                child,
            },
            Node::Project { projections, child } => Node::Project {
                projections: projections
                    .into_iter()
                    .map(&mut *f)
                    .collect::<DbResult<Vec<_>>>()?,
                child,
            },
            Node::InnerJoin { left, right, cond } => Node::InnerJoin {
                left,
                right,
                cond: f(cond)?,
            },
            Node::Sort { fields, child } => Node::Sort {
                fields: fields
                    .into_iter()
                    .map(|field| {
                        Ok(SortField {
                            expr: f(field.expr)?,
                            order: field.order,
                        })
                    })
                    .collect::<DbResult<Vec<_>>>()?,
                child,
            },
            other @ (Node::ResolvedTable(_)
            | Node::UnresolvedTable { .. }
            | Node::CrossJoin { .. }
            | Node::Limit { .. }
            | Node::Releaser(_)) => other,
        })
    }

    /// Bottom-up rewrite of every expression in every node of the tree.
    pub fn transform_expressions_up<F>(self, f: &mut F) -> DbResult<Node>
    where
        F: FnMut(Expr) -> DbResult<Expr>,
    {
        self.map_children(|child| child.transform_expressions_up(&mut *f))?
            .transform_expressions(&mut |e| e.transform_up(&mut *f))
    }

    /// Pre-order walk over nodes. Returning `false` skips that node's children.
    pub fn inspect<F>(&self, f: &mut F)
    where
        F: FnMut(&Node) -> bool,
    {
        if f(self) {
            for child in self.children() {
                child.inspect(f);
            }
        }
    }

    /// Visit every expression in the tree, node by node in pre-order.
    pub fn inspect_expressions<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr) -> bool,
    {
        self.inspect(&mut |node| {
            for e in node.expressions() {
                e.inspect(&mut *f);
            }
            true
        });
    }

    /// Build the row sequence for this node.
    pub fn row_iter(&self, ctx: &ExecutionContext) -> DbResult<Box<dyn RowIter>> {
        Ok(match self {
            Node::ResolvedTable(t) => t.table().row_iter(ctx)?,
            Node::UnresolvedTable { name } => {
                return Err(DbError::UnresolvedTable(name.clone()));
            }
            Node::Filter { predicate, child } => {
                Box::new(FilterIter::new(child.row_iter(ctx)?, predicate.clone()))
            }
            Node::Project { projections, child } => {
                Box::new(ProjectIter::new(child.row_iter(ctx)?, projections.clone()))
            }
            Node::InnerJoin { left, right, cond } => Box::new(JoinIter::new(
                left.row_iter(ctx)?,
                right.row_iter(ctx)?,
                Some(cond.clone()),
            )),
            Node::CrossJoin { left, right } => Box::new(JoinIter::new(
                left.row_iter(ctx)?,
                right.row_iter(ctx)?,
                None,
            )),
            Node::Sort { fields, child } => {
                Box::new(SortIter::new(child.row_iter(ctx)?, fields.clone()))
            }
            Node::Limit { limit, child } => Box::new(LimitIter::new(child.row_iter(ctx)?, *limit)),
            Node::Releaser(r) => r.row_iter(ctx)?,
        })
    }

    /// Render the plan as an indented tree.
    pub fn explain(&self) -> String {
        let head = match self {
            Node::ResolvedTable(t) => format!("ResolvedTable {}", t.table()),
            Node::UnresolvedTable { name } => format!("UnresolvedTable({name})"),
            Node::Filter { predicate, .. } => format!("Filter [{predicate}]"),
            Node::Project { projections, .. } => format!("Project [{}]", join_exprs(projections)),
            Node::InnerJoin { cond, .. } => format!("InnerJoin [{cond}]"),
            Node::CrossJoin { .. } => "CrossJoin".to_string(),
            Node::Sort { fields, .. } => {
                let keys: Vec<String> = fields
                    .iter()
                    .map(|f| match f.order {
                        SortOrder::Ascending => format!("{} ASC", f.expr),
                        SortOrder::Descending => format!("{} DESC", f.expr),
                    })
                    .collect();
                format!("Sort [{}]", keys.join(", "))
            }
            Node::Limit { limit, .. } => format!("Limit {limit}"),
            Node::Releaser(r) => return r.child.explain(),
        };
        let mut out = head;
        for child in self.children() {
            out.push('\n');
            out.push_str(&indent(&child.explain()));
        }
        out
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

/// Drain a plan into memory, closing the sequence afterwards.
pub fn collect_rows(node: &Node, ctx: &ExecutionContext) -> DbResult<Vec<Row>> {
    let mut iter = node.row_iter(ctx)?;
    let mut rows = Vec::new();
    loop {
        match iter.next() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break,
            Err(err) => {
                let _ = iter.close();
                return Err(err);
            }
        }
    }
    iter.close()?;
    Ok(rows)
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn indent(s: &str) -> String {
    s.lines()
        .map(|l| format!("  {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
