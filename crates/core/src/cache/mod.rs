//! SQLite-backed response cache organised in generations.
//!
//! - One generation (cache name) is active at a time; older generations are
//!   deleted wholesale at activation
//! - Entries are keyed by a SHA-256 of method and URL
//! - Automatic schema migrations, WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod store;
pub mod versioned;

pub use crate::Error;

pub use connection::CacheDb;
pub use store::{CacheEntry, GenerationInfo, ResponseStore};
pub use versioned::{EvictionReport, VersionedStore};
