//! CLI command implementations.

pub mod cached;
pub mod install;
