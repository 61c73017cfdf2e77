//! Command requests and their result shapes.
//!
//! Commands follow `module.verb` naming, e.g. `session.status` or
//! `browsingContext.navigate`. A protocol module defines one
//! [`CommandParameters`] type per command; the transport wraps it in the
//! outbound envelope and the driver converts the response into
//! [`CommandParameters::Result`].
//!
//! # Wire Format
//!
//! ```json
//! { "id": 1, "method": "session.status", "params": {} }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::identifiers::CommandId;

// ============================================================================
// CommandParameters
// ============================================================================

/// Parameters of one protocol command.
///
/// The implementing type serializes to the `params` object of the outbound
/// message.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize)]
/// struct StatusCommand;
///
/// #[derive(Deserialize)]
/// struct StatusResult {
///     ready: bool,
///     message: String,
/// }
///
/// impl CommandParameters for StatusCommand {
///     type Result = StatusResult;
///
///     fn method_name(&self) -> &str {
///         "session.status"
///     }
/// }
/// ```
pub trait CommandParameters: Serialize + Send + Sync {
    /// Shape the `result` object of a success response converts into.
    type Result: DeserializeOwned + Send + 'static;

    /// Protocol method name in `module.verb` format.
    fn method_name(&self) -> &str;
}

// ============================================================================
// CommandRequest
// ============================================================================

/// Outbound command envelope.
#[derive(Debug, Serialize)]
pub(crate) struct CommandRequest<'a, P> {
    /// Correlation id.
    pub id: CommandId,
    /// Method name.
    pub method: &'a str,
    /// Command parameters.
    pub params: &'a P,
}

impl<'a, P: CommandParameters> CommandRequest<'a, P> {
    /// Wraps `params` in an envelope with the given id.
    #[inline]
    pub(crate) fn new(id: CommandId, params: &'a P) -> Self {
        Self {
            id,
            method: params.method_name(),
            params,
        }
    }
}

// ============================================================================
// RawCommand
// ============================================================================

/// Untyped command for methods without a dedicated parameter type.
///
/// The result is returned as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    /// Method name in `module.verb` format.
    pub method: String,
    /// Params object sent as-is.
    pub params: Value,
}

impl RawCommand {
    /// Creates a raw command.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Creates a raw command with an empty params object.
    #[inline]
    #[must_use]
    pub fn without_params(method: impl Into<String>) -> Self {
        Self::new(method, Value::Object(Map::new()))
    }
}

impl Serialize for RawCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

impl CommandParameters for RawCommand {
    type Result = Value;

    fn method_name(&self) -> &str {
        &self.method
    }
}

// ============================================================================
// EmptyResult
// ============================================================================

/// Result of commands whose success response carries no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EmptyResult {}

// ============================================================================
// ErrorResult
// ============================================================================

/// Error payload of an error response.
///
/// # Format
///
/// ```json
/// {
///   "type": "error",
///   "id": 1,
///   "error": "unknown command",
///   "message": "Unknown command 'foo.bar'",
///   "stacktrace": "..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    /// Error code, e.g. `unknown command` or `invalid argument`.
    #[serde(rename = "error")]
    pub error_type: String,

    /// Human-readable error message.
    pub message: String,

    /// Remote end stack trace, if provided.
    #[serde(rename = "stacktrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
