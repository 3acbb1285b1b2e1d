//! # Studio Infrastructure
//!
//! Concrete implementations of the ports defined in `studio-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis-backed window store for multi-instance deployments

pub mod window_store;

// Re-exports - In-Memory
pub use window_store::{MemoryWindowStore, MemoryWindowStoreConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use window_store::{RedisWindowStore, RedisWindowStoreConfig};
