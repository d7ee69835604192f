//! Ad lifecycle module.
//!
//! One controller per ad surface (interstitial, rewarded, app-open) drives
//! the injected ad SDK through load and show, consuming its callbacks as a
//! typed event stream tagged with a load generation.

pub mod controller;
pub mod state;

pub use controller::*;
pub use state::*;
