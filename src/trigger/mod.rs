//! Trigger coordination module.
//!
//! Combines the four gates into one admission decision and decides when to
//! ask for it:
//! - Navigation (tab switch / screen) trigger
//! - App-resume trigger
//! - Conversation session-end trigger

pub mod coordinator;
pub mod decision;
pub mod events;

pub use coordinator::*;
pub use decision::*;
pub use events::*;
