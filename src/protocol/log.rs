//! Diagnostic log notifications.
//!
//! Connection, transport and driver each publish [`LogMessageEventArgs`]
//! through their own log event. Every entry is also emitted through
//! `tracing` at the matching level.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;

use tracing::{debug, error, info, trace, warn};

// ============================================================================
// LogLevel
// ============================================================================

/// Severity of a log notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Very detailed diagnostics.
    Trace,
    /// Debugging information.
    Debug,
    /// Informational messages.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Failures that were handled locally.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
        })
    }
}

// ============================================================================
// LogMessageEventArgs
// ============================================================================

/// One log notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessageEventArgs {
    /// Log text.
    pub message: String,
    /// Severity.
    pub level: LogLevel,
    /// Component that emitted the entry (`Connection`, `Transport`, `Driver`).
    pub component_name: String,
    /// When the entry was created.
    pub timestamp: SystemTime,
}

impl LogMessageEventArgs {
    /// Creates a log entry timestamped now.
    #[must_use]
    pub fn new(
        level: LogLevel,
        component_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            level,
            component_name: component_name.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Emits this entry through `tracing`.
    pub(crate) fn trace(&self) {
        let component = self.component_name.as_str();
        let message = self.message.as_str();
        match self.level {
            LogLevel::Trace => trace!(component, "{message}"),
            LogLevel::Debug => debug!(component, "{message}"),
            LogLevel::Info => info!(component, "{message}"),
            LogLevel::Warn => warn!(component, "{message}"),
            LogLevel::Error => error!(component, "{message}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
