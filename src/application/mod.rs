//! Application services layer.

pub mod error;
pub mod guard;
pub mod options;
pub mod repos;
pub mod taxonomy;
