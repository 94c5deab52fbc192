//! Storage backends for quotes, source profiles and correction rules.
//!
//! - `MemoryStore` - one lock over all tables; tests and embedding
//! - `SqliteStore` - sqlx SQLite with unique constraints doing the
//!   batch and attachment guarantees (requires `sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
