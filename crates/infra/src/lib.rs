//! Infrastructure layer: caching, role storage, configuration.

pub mod cache;
pub mod config;
pub mod roles;
