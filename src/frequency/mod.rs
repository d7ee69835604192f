//! Frequency policy module.
//!
//! Interaction and impression counters with the cooldown and session-cap
//! rules applied before an interstitial is shown.

pub mod data;
pub mod policy;

pub use data::*;
pub use policy::*;
