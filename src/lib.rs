//! Taxonomy and option data-access core.
//!
//! Hierarchical terms (categories, tags, custom taxonomies) are read through a
//! batching children loader, options through a tenant-aware cache, and every
//! write is gated by a capability check.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
