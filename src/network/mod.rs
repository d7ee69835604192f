//! Network quality module.
//!
//! Tracks connectivity transitions reported by the platform and derives
//! whether the current network is suitable for requesting an ad:
//! - Connection state and bounded transition history
//! - Signal strength estimation per connection type
//! - Flapping detection over a trailing window

pub mod monitor;
pub mod state;

pub use monitor::*;
pub use state::*;
