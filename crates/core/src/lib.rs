//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Request/response descriptors with explicit duplication
//! - The generation-namespaced response cache and its SQLite backend
//! - The durable offline action queue store
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod queue;

pub use cache::{CacheDb, CacheEntry, EvictionReport, ResponseStore, VersionedStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Headers, Request, Response, ResponseType};
pub use queue::{ActionStore, ActionType, NewAction, QueuedAction};
