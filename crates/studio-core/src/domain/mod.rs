//! Domain types - quota policies and their resolution rules.

mod policy;

pub use policy::{Policy, PolicyTable, Role, Scope};
