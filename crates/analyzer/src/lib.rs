//! Pushdown analysis for resolved plans.
//!
//! The pass pushes three things into base tables that advertise the matching
//! capability:
//!
//! - filter conjuncts that mention only that table,
//! - the list of columns the query actually reads,
//! - an index lookup chosen by an [`IndexAssigner`].
//!
//! Index handles taken for the lookups are borrowed from the catalog and
//! given back exactly once, by a [`plan::Releaser`] wrapped around the
//! rewritten plan.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use analyzer::Analyzer;
//! use catalog::Catalog;
//! use plan::Node;
//!
//! let analyzer = Analyzer::new(Arc::new(Catalog::new()));
//! let plan = analyzer.pushdown(Node::unresolved("users")).unwrap();
//! assert_eq!(plan, Node::unresolved("users"));
//! ```

#[cfg(test)]
mod tests;

mod assign;
mod columns;
mod filters;
mod fixup;
mod pushdown;

pub use assign::{CatalogIndexAssigner, IndexAssigner, IndexAssignment, TableIndex};
pub use columns::ColumnUsage;
pub use filters::{TableFilters, unhandled_filters};
pub use fixup::{fix_field_indexes, fix_field_indexes_any, fix_field_indexes_on_expressions};

use std::{fmt, sync::Arc};

use ahash::RandomState;
use catalog::Catalog;
use common::{Config, DbResult};
use hashbrown::HashMap;
use plan::Node;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Entry point for the pushdown pass.
pub struct Analyzer {
    catalog: Arc<Catalog>,
    config: Config,
    assigner: Box<dyn IndexAssigner>,
}

impl Analyzer {
    /// Analyzer with default configuration, choosing indexes from `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let assigner = Box::new(CatalogIndexAssigner::new(Arc::clone(&catalog)));
        Self {
            catalog,
            config: Config::default(),
            assigner,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replace the index chooser. Its handles must come from this analyzer's
    /// catalog.
    pub fn with_index_assigner(mut self, assigner: impl IndexAssigner + 'static) -> Self {
        self.assigner = Box::new(assigner);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Rewrite `node`, pushing filters, projections and index lookups into
    /// the tables that accept them.
    ///
    /// Unresolved plans come back unchanged. On error every index handle the
    /// pass received has already been released.
    pub fn pushdown(&self, node: Node) -> DbResult<Node> {
        pushdown::pushdown(&self.catalog, &self.config, self.assigner.as_ref(), node)
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("catalog", &self.catalog)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
