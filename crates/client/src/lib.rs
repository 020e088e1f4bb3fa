//! Client side of swcache.
//!
//! This crate provides the network transport, request classification, the
//! cache-first and network-first strategies, and the offline action queue
//! drain shared by the server and CLI.

pub mod fetch;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod queue;
pub mod strategy;

pub use fetch::{FetchClient, FetchConfig, Transport};
pub use queue::{DrainReport, OfflineActionQueue};
pub use strategy::{RequestClass, Resolution, ResponseSource, StrategySelector, cache_first, network_first};
