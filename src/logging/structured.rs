//! Structured logging utilities.
//!
//! Provides context-aware logging with component, surface and request id
//! included in every log message.

use std::fmt;

use uuid::Uuid;

/// Logging context for one gate or one ad surface.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub surface: Option<String>,
    pub request_id: Option<String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            surface: None,
            request_id: None,
        }
    }

    pub fn with_surface(&self, surface: &str) -> Self {
        Self {
            component: self.component.clone(),
            surface: Some(surface.to_string()),
            request_id: self.request_id.clone(),
        }
    }

    pub fn with_request(&self, request_id: &str) -> Self {
        Self {
            component: self.component.clone(),
            surface: self.surface.clone(),
            request_id: Some(request_id.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[component={}]", self.component)?;
        if let Some(surface) = &self.surface {
            write!(f, " [surface={}]", surface)?;
        }
        if let Some(rid) = &self.request_id {
            write!(f, " [req={}]", rid)?;
        }
        Ok(())
    }
}

/// Generate a short correlation id such as `load-1a2b3c4d`.
pub fn new_request_id(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*) $(, $value)*)
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*) $(, $value)*)
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*) $(, $value)*)
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*) $(, $value)*)
        );
    };
}
