mod memory;
mod postgres;
mod traits;
mod types;

pub use memory::{MemorySessionStore, SessionEntry};
pub use postgres::PostgresSessionStore;
pub use traits::{SessionStore, StorageError, StorageResult};
pub use types::*;
