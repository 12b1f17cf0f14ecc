//! Role storage: the repository contract, its backends, and the caching decorator.

mod cached;
mod in_memory;
mod postgres;
mod repository;

pub use cached::CachedRoleRepository;
pub use in_memory::InMemoryRoleRepository;
pub use postgres::PostgresRoleRepository;
pub use repository::{NewRole, RoleRepository, RoleStoreError, RoleUpdate};
