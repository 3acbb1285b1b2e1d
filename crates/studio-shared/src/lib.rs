//! # Studio Shared
//!
//! Serializable API types shared between the server and its clients.

pub mod response;

pub use response::{ApiResponse, ErrorResponse, RateLimitExceeded};
