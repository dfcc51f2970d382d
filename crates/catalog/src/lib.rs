//! Index catalog: index definitions plus the checkout bookkeeping that lets
//! queries borrow an index while they run.
//!
//! A query obtains an [`IndexHandle`] through [`Catalog::retain_index`] and
//! gives it back through [`Catalog::release_index`]. Handles are not `Clone`,
//! so handing one back consumes it.

mod lookup;

pub use lookup::{IndexLookup, LookupPredicate};

use std::sync::{Mutex, PoisonError};

use ahash::RandomState;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

type Map<K, V> = HashMap<K, V, RandomState>;

/// Unique identifier for an index definition stored in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u64);

/// Supported index implementations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
}

impl IndexKind {
    /// Whether the index keeps keys ordered and can answer range lookups.
    pub fn supports_range(&self) -> bool {
        matches!(self, IndexKind::BTree)
    }
}

/// Metadata describing a table index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMeta {
    pub id: IndexId,
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub kind: IndexKind,
}

/// A checked-out index. Must be returned with [`Catalog::release_index`].
#[derive(Debug, PartialEq, Eq)]
pub struct IndexHandle {
    id: IndexId,
    name: String,
    table: String,
}

impl IndexHandle {
    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Catalog of index definitions and their current use counts.
#[derive(Debug, Default)]
pub struct Catalog {
    indexes: Vec<IndexMeta>,
    next_index_id: u64,
    name_lookup: Map<(String, String), usize>,
    id_lookup: Map<IndexId, usize>,
    in_use: Mutex<Map<IndexId, usize>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            next_index_id: 1,
            ..Self::default()
        }
    }

    /// Create an index over the given table columns, returning its identifier.
    pub fn create_index(
        &mut self,
        table: &str,
        name: &str,
        columns: &[&str],
        kind: IndexKind,
    ) -> DbResult<IndexId> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "index must reference at least one column".into(),
            ));
        }
        let key = (table.to_string(), name.to_string());
        if self.name_lookup.contains_key(&key) {
            return Err(DbError::Catalog(format!(
                "index '{name}' already exists on table '{table}'"
            )));
        }
        let id = IndexId(self.next_index_id.max(1));
        self.next_index_id = id.0 + 1;
        self.indexes.push(IndexMeta {
            id,
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            kind,
        });
        self.rebuild_lookups();
        Ok(id)
    }

    /// Drop an index. Refused while any query still holds it.
    pub fn drop_index(&mut self, table: &str, name: &str) -> DbResult<()> {
        let id = self.index(table, name)?.id;
        if self.use_count(id) > 0 {
            return Err(DbError::Catalog(format!(
                "index '{name}' on table '{table}' is in use"
            )));
        }
        self.indexes.retain(|idx| idx.id != id);
        self.rebuild_lookups();
        Ok(())
    }

    /// Lookup an index by table and name.
    pub fn index(&self, table: &str, name: &str) -> DbResult<&IndexMeta> {
        let pos = self
            .name_lookup
            .get(&(table.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| {
                DbError::Catalog(format!(
                    "index '{name}' does not exist on table '{table}'"
                ))
            })?;
        self.indexes
            .get(pos)
            .ok_or_else(|| DbError::Catalog(format!("index '{name}' missing on '{table}'")))
    }

    /// Lookup an index by identifier.
    pub fn index_by_id(&self, id: IndexId) -> DbResult<&IndexMeta> {
        self.id_lookup
            .get(&id)
            .and_then(|pos| self.indexes.get(*pos))
            .ok_or_else(|| DbError::Catalog(format!("unknown index id {}", id.0)))
    }

    /// All indexes defined on a table, in creation order.
    pub fn indexes_for<'a, 't>(&'a self, table: &'t str) -> impl Iterator<Item = &'a IndexMeta> + 't
    where
        'a: 't,
    {
        self.indexes.iter().filter(move |idx| idx.table == table)
    }

    /// First single-column index covering `column` of `table`.
    pub fn index_for_column(&self, table: &str, column: &str) -> Option<&IndexMeta> {
        self.indexes_for(table)
            .find(|idx| idx.columns.len() == 1 && idx.columns[0] == column)
    }

    /// Check an index out for the duration of a query.
    pub fn retain_index(&self, id: IndexId) -> DbResult<IndexHandle> {
        let meta = self.index_by_id(id)?;
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        *in_use.entry(id).or_insert(0) += 1;
        Ok(IndexHandle {
            id,
            name: meta.name.clone(),
            table: meta.table.clone(),
        })
    }

    /// Give back a handle obtained from [`Catalog::retain_index`].
    pub fn release_index(&self, handle: IndexHandle) {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_use.get_mut(&handle.id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_use.remove(&handle.id);
            }
        }
    }

    /// Number of handles currently checked out for an index.
    pub fn use_count(&self, id: IndexId) -> usize {
        let in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        in_use.get(&id).copied().unwrap_or(0)
    }

    /// Total number of handles checked out across all indexes.
    pub fn handles_in_use(&self) -> usize {
        let in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        in_use.values().sum()
    }

    fn rebuild_lookups(&mut self) {
        self.name_lookup.clear();
        self.id_lookup.clear();
        for (pos, index) in self.indexes.iter().enumerate() {
            self.name_lookup
                .insert((index.table.clone(), index.name.clone()), pos);
            self.id_lookup.insert(index.id, pos);
        }
    }
}
