//! # Studio Core
//!
//! The domain layer of the Studio backend.
//! This crate contains pure business logic with zero infrastructure dependencies.
//!
//! The one nontrivial subsystem is the request rate limiter: a policy engine
//! that decides, per caller and per endpoint, whether an incoming request is
//! admitted. The [`limiter::Limiter`] resolves a quota from the
//! [`domain::PolicyTable`], consults a [`ports::WindowStore`] implementation
//! (in-memory or Redis, provided by `studio-infra`), and produces a
//! [`limiter::Decision`] the admission middleware turns into headers or a 429.

pub mod domain;
pub mod limiter;
pub mod ports;

pub use limiter::{Decision, FailurePolicy, Identity, LimitError, Limiter, RequestContext};
