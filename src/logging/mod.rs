//! Structured logging with decision context.
//!
//! Provides logging macros and utilities that include the component, ad
//! surface and request id in every log message for easy correlation.

pub mod structured;

pub use structured::*;
