use crate::IndexId;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, ops::Bound};
use types::Value;

/// Predicate an index lookup restricts a scan with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupPredicate {
    Eq(Value),
    Range { low: Bound<Value>, high: Bound<Value> },
}

impl LookupPredicate {
    /// True if `value` falls inside the lookup. NULL never matches.
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        match self {
            LookupPredicate::Eq(expected) => value.cmp_same_type(expected) == Some(Ordering::Equal),
            LookupPredicate::Range { low, high } => {
                let above = match low {
                    Bound::Unbounded => true,
                    Bound::Included(v) => matches!(
                        value.cmp_same_type(v),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Bound::Excluded(v) => value.cmp_same_type(v) == Some(Ordering::Greater),
                };
                let below = match high {
                    Bound::Unbounded => true,
                    Bound::Included(v) => {
                        matches!(value.cmp_same_type(v), Some(Ordering::Less | Ordering::Equal))
                    }
                    Bound::Excluded(v) => value.cmp_same_type(v) == Some(Ordering::Less),
                };
                above && below
            }
        }
    }
}

/// Lookup descriptor handed to a table that accepts index lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLookup {
    pub index: IndexId,
    pub index_name: String,
    pub table: String,
    pub column: String,
    pub predicate: LookupPredicate,
}

impl fmt::Display for IndexLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.index_name)?;
        match &self.predicate {
            LookupPredicate::Eq(v) => write!(f, "{} = {v}", self.column)?,
            LookupPredicate::Range { low, high } => {
                match low {
                    Bound::Included(v) => write!(f, "{v} <= ")?,
                    Bound::Excluded(v) => write!(f, "{v} < ")?,
                    Bound::Unbounded => {}
                }
                f.write_str(&self.column)?;
                match high {
                    Bound::Included(v) => write!(f, " <= {v}")?,
                    Bound::Excluded(v) => write!(f, " < {v}")?,
                    Bound::Unbounded => {}
                }
            }
        }
        f.write_str(")")
    }
}
