//! In-process caching primitives.

mod sweeper;
mod ttl;

pub use sweeper::{SweeperHandle, spawn_sweeper};
pub use ttl::{FetchTicket, TtlCache};
