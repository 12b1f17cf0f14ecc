//! `risknexus-core`: identifiers and the domain error model shared by every crate.
//!
//! No storage, transport, or async concerns live here.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{RoleId, TenantId, UserId};
