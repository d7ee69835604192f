//! Consent gate module.
//!
//! Caches the legal consent state reported by the consent SDK and answers
//! whether ads may be requested. Any ambiguity resolves to "no".

pub mod gate;
pub mod info;

pub use gate::*;
pub use info::*;
