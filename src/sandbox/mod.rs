//! Sandbox module containing all execution-related components.

pub mod cache;
pub mod capability;
pub mod config;
pub mod context;
pub mod executor;
pub mod limits;
pub mod structure;
