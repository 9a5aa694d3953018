//! Traits for value set resolution.
//!
//! This module defines the [`ValueSetResolver`] trait that any value set
//! catalog must implement to be consulted by the [`TreeCompiler`](crate::TreeCompiler).
//!
//! The catalog is a read-only lookup service: the compiler calls it
//! synchronously while walking a tree and never writes back to it.
//!
//! # Example: a single-entry resolver
//!
//! ```rust
//! use cds_cql::{ValueSetCategory, ValueSetGroup, ValueSetResource};
//! use cds_cql_generator::ValueSetResolver;
//!
//! struct LdlOnly;
//!
//! impl ValueSetResolver for LdlOnly {
//!     fn resolve(&self, category: ValueSetCategory, id: &str) -> Option<ValueSetGroup> {
//!         (category == ValueSetCategory::Observation && id == "ldl").then(|| {
//!             ValueSetGroup::new(
//!                 "ldl",
//!                 vec![ValueSetResource::new("LDL Cholesterol", "2.16.840.1.113883.3.117.1.7.1.215")],
//!             )
//!         })
//!     }
//! }
//!
//! assert!(LdlOnly.resolve(ValueSetCategory::Observation, "ldl").is_some());
//! assert!(LdlOnly.resolve(ValueSetCategory::Condition, "ldl").is_none());
//! ```

use cds_cql::{ValueSetCategory, ValueSetGroup};

/// Read-only lookup of value set groups by category and id.
pub trait ValueSetResolver: Send + Sync {
    /// Returns the group registered under `id` for `category`, if any.
    fn resolve(&self, category: ValueSetCategory, id: &str) -> Option<ValueSetGroup>;
}

impl<T: ValueSetResolver + ?Sized> ValueSetResolver for &T {
    fn resolve(&self, category: ValueSetCategory, id: &str) -> Option<ValueSetGroup> {
        (**self).resolve(category, id)
    }
}

impl<T: ValueSetResolver + ?Sized> ValueSetResolver for std::sync::Arc<T> {
    fn resolve(&self, category: ValueSetCategory, id: &str) -> Option<ValueSetGroup> {
        (**self).resolve(category, id)
    }
}
