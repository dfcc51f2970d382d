use crate::Map;
use plan::Node;

/// Columns each table tag is referenced by, in first-occurrence order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnUsage {
    by_table: Map<String, Vec<String>>,
}

impl ColumnUsage {
    /// Walk every expression of every node and record each distinct
    /// `(table, column)` field reference once.
    pub fn collect(node: &Node) -> Self {
        let mut usage = Self::default();
        node.inspect_expressions(&mut |e| {
            if let expr::Expr::GetField(gf) = e {
                usage.record(&gf.table, &gf.name);
            }
            true
        });
        usage
    }

    fn record(&mut self, table: &str, column: &str) {
        let columns = self.by_table.entry(table.to_string()).or_default();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.by_table.get(table).map(Vec::as_slice)
    }

    pub fn table_count(&self) -> usize {
        self.by_table.len()
    }
}
