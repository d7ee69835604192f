//! Storage module.
//!
//! Best-effort persistence for gate state. The key-value backend is an
//! external collaborator; this module provides the trait it must satisfy,
//! an in-memory implementation, and typed snapshot helpers on top of it.

pub mod kv;
pub mod snapshots;

pub use kv::*;
pub use snapshots::*;
