//! Taxonomy queries and capability-checked mutations.

mod loader;
mod service;
mod types;

pub use loader::{CascadeLoader, ChildrenRequest};
pub(crate) use loader::{METRIC_CASCADE_BATCH_SIZE, METRIC_CASCADE_DISPATCH};
pub use service::{TaxonomyError, TaxonomyService};
pub use types::{
    CreateNodeCommand, NodeFilter, ObjectNodeFilter, RelationshipCommand, TaxonomyConfig,
    TreeNode, UpdateNodeCommand,
};
