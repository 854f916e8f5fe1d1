//! Domain layer types and invariants.

pub mod capability;
pub mod error;
pub mod options;
pub mod slug;
pub mod taxonomy;
