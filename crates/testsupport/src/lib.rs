//! Test support utilities for the pushdown workspace.
//!
//! This crate provides shared testing infrastructure:
//! - The `t(a, b, c)` and `u(b, d)` memory tables with configurable capabilities
//! - A catalog with indexes over those tables
//! - Field, literal and predicate builders
//! - Counting release hooks for checking exactly-once release
//! - Property-based generators for predicates over the fixture tables
//!
//! # Example Usage
//!
//! ```
//! use testsupport::prelude::*;
//!
//! let plan = filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all()));
//! assert_eq!(count_filters(&plan), 1);
//! ```

pub mod assertions;
pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::fixtures::*;
    pub use storage::{Capabilities, MemoryTable};
}
