//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod window_store;

pub use window_store::{WindowSnapshot, WindowStore, WindowStoreError};
