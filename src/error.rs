//! Error types for the WebDriver BiDi client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webdriver_bidi::{Driver, Result};
//!
//! async fn example(driver: &Driver) -> Result<()> {
//!     let status = driver.execute_command(&StatusCommand).await?;
//!     println!("ready: {}", status.ready);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::AlreadyConnected`], [`Error::NotConnected`], [`Error::DispatchReentrancy`] |
//! | Correlation | [`Error::CommandTimeout`], [`Error::CommandFailed`], [`Error::ResultConversion`], [`Error::ErrorConversion`], [`Error::EmptyResponse`] |
//! | Registry | [`Error::ModuleNotRegistered`], [`Error::ModuleTypeMismatch`], [`Error::EventAlreadyRegistered`], [`Error::DriverDropped`] |
//! | Observers | [`Error::ObserverLimit`], [`Error::CheckpointAlreadySet`], [`Error::InvalidCheckpointCount`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;
use crate::protocol::ErrorResult;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when driver configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid remote end URL.
    #[error("Invalid URL '{url}': {message}")]
    Url {
        /// The rejected URL.
        url: String,
        /// Why the URL was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the connection cannot be established or written to.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed while an operation was in progress.
    #[error("Connection closed")]
    ConnectionClosed,

    /// `connect` was called on a transport that is already connected.
    #[error("The transport is already connected")]
    AlreadyConnected,

    /// A command was sent before `connect` or after `close`.
    #[error("The transport is not connected")]
    NotConnected,

    /// `close` or `connect` was called from a synchronous observer, which
    /// runs on the dispatch task the call would wait for.
    #[error(
        "The transport cannot be closed or reconnected from a synchronous observer; use an asynchronous observer"
    )]
    DispatchReentrancy,

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No response arrived within the driver's command timeout.
    #[error("Timed out executing command {command}")]
    CommandTimeout {
        /// Method name of the command.
        command: String,
    },

    /// The remote end answered with an error response.
    #[error("'{}' error executing command {command}: {}", error_type(.error), error_message(.error))]
    CommandFailed {
        /// Method name of the command.
        command: String,
        /// The error payload sent by the remote end.
        error: ErrorResult,
    },

    /// A success response could not be converted to the expected result type.
    #[error("Could not convert response from transport for SendCommandAndWait to {type_name}")]
    ResultConversion {
        /// Name of the expected result type.
        type_name: &'static str,
        /// Underlying decode failure, if the transport reported one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An error response could not be converted to [`ErrorResult`].
    #[error("Could not convert error response from transport for SendCommandAndWait to ErrorResult")]
    ErrorConversion {
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// The pending completion was dropped without a result or an error.
    #[error("Result and thrown exception for command {command} with id {id} are both null")]
    EmptyResponse {
        /// Method name of the command.
        command: String,
        /// Identifier the command was sent with.
        id: CommandId,
    },

    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// No module registered under the requested name.
    #[error("Module '{name}' is not registered with this driver")]
    ModuleNotRegistered {
        /// Requested module name.
        name: String,
    },

    /// A module is registered under the name but has a different type.
    #[error(
        "Module '{name}' is registered with this driver, but the module object is not of type {expected}"
    )]
    ModuleTypeMismatch {
        /// Requested module name.
        name: String,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// An event name was bound to a payload type twice.
    #[error("Event '{event_name}' is already registered with this driver")]
    EventAlreadyRegistered {
        /// The event name.
        event_name: String,
    },

    /// A weak driver handle outlived its driver.
    #[error("The driver has been dropped")]
    DriverDropped,

    // ========================================================================
    // Observer Errors
    // ========================================================================
    /// Adding an observer would exceed the event's observer limit.
    #[error("This observable event only allows {max} {}", handler_noun(.max))]
    ObserverLimit {
        /// Maximum number of observers for the event.
        max: usize,
    },

    /// A checkpoint is already active on the observer.
    #[error("This observer already has a checkpoint set")]
    CheckpointAlreadySet,

    /// Checkpoint counts must be at least one.
    #[error("Checkpoint count must be greater than zero")]
    InvalidCheckpointCount,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Display Helpers
// ============================================================================

fn error_type(error: &ErrorResult) -> &str {
    &error.error_type
}

fn error_message(error: &ErrorResult) -> &str {
    &error.message
}

fn handler_noun(max: &usize) -> &'static str {
    if *max == 1 { "handler" } else { "handlers" }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(command: impl Into<String>) -> Self {
        Self::CommandTimeout {
            command: command.into(),
        }
    }

    /// Creates an error for a remote end error response.
    #[inline]
    pub fn command_failed(command: impl Into<String>, error: ErrorResult) -> Self {
        Self::CommandFailed {
            command: command.into(),
            error,
        }
    }

    /// Creates a result conversion error.
    #[inline]
    pub fn result_conversion(type_name: &'static str, source: Option<serde_json::Error>) -> Self {
        Self::ResultConversion { type_name, source }
    }

    /// Creates an empty response error.
    #[inline]
    pub fn empty_response(command: impl Into<String>, id: CommandId) -> Self {
        Self::EmptyResponse {
            command: command.into(),
            id,
        }
    }

    /// Creates a module not registered error.
    #[inline]
    pub fn module_not_registered(name: impl Into<String>) -> Self {
        Self::ModuleNotRegistered { name: name.into() }
    }

    /// Creates a module type mismatch error.
    #[inline]
    pub fn module_type_mismatch(name: impl Into<String>, expected: &'static str) -> Self {
        Self::ModuleTypeMismatch {
            name: name.into(),
            expected,
        }
    }

    /// Creates an event already registered error.
    #[inline]
    pub fn event_already_registered(event_name: impl Into<String>) -> Self {
        Self::EventAlreadyRegistered {
            event_name: event_name.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a command timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::AlreadyConnected
                | Self::NotConnected
                | Self::DispatchReentrancy
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a module or event registry error.
    #[inline]
    #[must_use]
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotRegistered { .. }
                | Self::ModuleTypeMismatch { .. }
                | Self::EventAlreadyRegistered { .. }
        )
    }

    /// Returns the remote end error payload, if this is an error response.
    #[inline]
    #[must_use]
    pub fn error_result(&self) -> Option<&ErrorResult> {
        match self {
            Self::CommandFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn error_result() -> ErrorResult {
        ErrorResult {
            error_type: "unknown command".into(),
            message: "not implemented".into(),
            stack_trace: None,
        }
    }

    #[test]
    fn test_command_timeout_display() {
        let err = Error::command_timeout("session.status");
        assert_eq!(err.to_string(), "Timed out executing command session.status");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_command_failed_display() {
        let err = Error::command_failed("module.command", error_result());
        assert_eq!(
            err.to_string(),
            "'unknown command' error executing command module.command: not implemented"
        );
        assert_eq!(
            err.error_result().map(|e| e.error_type.as_str()),
            Some("unknown command")
        );
    }

    #[test]
    fn test_conversion_display() {
        let err = Error::result_conversion("EmptyResult", None);
        assert_eq!(
            err.to_string(),
            "Could not convert response from transport for SendCommandAndWait to EmptyResult"
        );
    }

    #[test]
    fn test_empty_response_display() {
        let err = Error::empty_response("module.command", CommandId::new(7));
        assert_eq!(
            err.to_string(),
            "Result and thrown exception for command module.command with id 7 are both null"
        );
    }

    #[test]
    fn test_registry_display() {
        let missing = Error::module_not_registered("session");
        assert_eq!(
            missing.to_string(),
            "Module 'session' is not registered with this driver"
        );

        let mismatch = Error::module_type_mismatch("session", "BrowserModule");
        assert_eq!(
            mismatch.to_string(),
            "Module 'session' is registered with this driver, but the module object is not of type BrowserModule"
        );
        assert!(missing.is_registry_error());
        assert!(mismatch.is_registry_error());
    }

    #[test]
    fn test_observer_limit_display() {
        assert_eq!(
            Error::ObserverLimit { max: 1 }.to_string(),
            "This observable event only allows 1 handler"
        );
        assert_eq!(
            Error::ObserverLimit { max: 3 }.to_string(),
            "This observable event only allows 3 handlers"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("refused").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::DispatchReentrancy.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
