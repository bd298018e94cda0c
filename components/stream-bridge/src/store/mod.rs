//! Backing store access: the [`client::LogStore`] seam and its implementations.

pub mod client;
pub mod memory_store;
pub mod models;
pub mod redis_store;
