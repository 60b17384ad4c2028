//! Storage layer for cutover-daemon
//!
//! Persists stack records and the advisory locks that serialize their
//! reconciliation.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{StackStorage, StorageResult};
