pub mod collection;
pub mod document;
pub mod manager;
pub mod memory;
pub mod postgres;

pub use collection::{Collection, Document, FindQuery, Store};
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::{MemoryCollection, MemoryStore};
pub use postgres::{PgCollection, PgStore};
