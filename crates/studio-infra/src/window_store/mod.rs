//! Window store implementations - in-memory and Redis.

mod memory;

pub use memory::{MemoryWindowStore, MemoryWindowStoreConfig};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisWindowStore, RedisWindowStoreConfig};
