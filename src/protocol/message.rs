//! Inbound message classification.
//!
//! Every text payload received from the remote end is classified into exactly
//! one [`InboundMessage`] variant. Classification never fails: anything that
//! does not decode ends up as [`InboundMessage::Unclassifiable`] with the
//! reason attached.
//!
//! # Message Types
//!
//! | `type` | Required fields | Variant |
//! |--------|-----------------|---------|
//! | `success` | `id` (integer), `result` | [`InboundMessage::CommandSuccess`] |
//! | `error` | `id` (integer or null, may be absent) | [`InboundMessage::CommandError`] |
//! | `event` | `method` (string), `params` | [`InboundMessage::ProtocolEvent`] |
//! | missing / other | | [`InboundMessage::Unclassifiable`] |
//!
//! Error payload fields (`error`, `message`, `stacktrace`) are left in the raw
//! payload and converted by the transport, which knows whether a caller is
//! waiting for them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::CommandId;

// ============================================================================
// InboundMessage
// ============================================================================

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Success response to a command.
    CommandSuccess {
        /// Id of the command this answers.
        id: CommandId,
        /// The raw `result` object.
        result: Value,
    },

    /// Error response, possibly not associated with any command.
    CommandError {
        /// Id of the command this answers, if any.
        id: Option<CommandId>,
        /// The full raw message object.
        payload: Value,
    },

    /// Event pushed by the remote end.
    ProtocolEvent {
        /// Event name in `module.eventName` format.
        event_name: String,
        /// The raw `params` object.
        params: Value,
    },

    /// Anything that does not match a known shape.
    Unclassifiable {
        /// Why classification failed.
        reason: UnclassifiableReason,
    },
}

// ============================================================================
// UnclassifiableReason
// ============================================================================

/// Why a message could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnclassifiableReason {
    /// The text is not valid JSON.
    InvalidJson(String),
    /// `type` is `success` but the envelope does not decode.
    InvalidSuccess(String),
    /// `type` is `error` but the envelope does not decode.
    InvalidError(String),
    /// `type` is `event` but the envelope does not decode.
    InvalidEvent(String),
    /// `type` is missing or not a known message type.
    UnknownType,
}

impl UnclassifiableReason {
    /// Returns the Error-level log line for this failure, if one is due.
    ///
    /// An unknown `type` is not logged; it only produces an unknown-message
    /// notification.
    #[must_use]
    pub fn log_message(&self) -> Option<String> {
        match self {
            Self::InvalidJson(e) => Some(format!("Unexpected error parsing JSON message: {e}")),
            Self::InvalidSuccess(e) => Some(format!("Unexpected error parsing success JSON: {e}")),
            Self::InvalidError(e) => Some(format!("Unexpected error parsing error JSON: {e}")),
            Self::InvalidEvent(e) => Some(format!("Unexpected error parsing event JSON: {e}")),
            Self::UnknownType => None,
        }
    }
}

impl fmt::Display for UnclassifiableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.log_message() {
            Some(message) => f.write_str(&message),
            None => f.write_str("Unknown message type"),
        }
    }
}

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Deserialize)]
struct SuccessEnvelope {
    id: CommandId,
    result: Value,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    id: Option<CommandId>,
}

#[derive(Deserialize)]
struct EventEnvelope {
    method: String,
    params: Value,
}

/// Discriminator of the envelope.
#[derive(Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Event,
}

impl MessageType {
    fn of(value: &Value) -> Option<Self> {
        match value.get("type")?.as_str()? {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

impl InboundMessage {
    /// Classifies one inbound text payload.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Self::unclassifiable(UnclassifiableReason::InvalidJson(e.to_string())),
        };

        let Some(message_type) = MessageType::of(&value) else {
            return Self::unclassifiable(UnclassifiableReason::UnknownType);
        };

        match message_type {
            MessageType::Success => match SuccessEnvelope::deserialize(&value) {
                Ok(envelope) => Self::CommandSuccess {
                    id: envelope.id,
                    result: envelope.result,
                },
                Err(e) => Self::unclassifiable(UnclassifiableReason::InvalidSuccess(e.to_string())),
            },

            MessageType::Error => match ErrorEnvelope::deserialize(&value) {
                Ok(envelope) => Self::CommandError {
                    id: envelope.id,
                    payload: value,
                },
                Err(e) => Self::unclassifiable(UnclassifiableReason::InvalidError(e.to_string())),
            },

            MessageType::Event => match EventEnvelope::deserialize(&value) {
                Ok(envelope) => Self::ProtocolEvent {
                    event_name: envelope.method,
                    params: envelope.params,
                },
                Err(e) => Self::unclassifiable(UnclassifiableReason::InvalidEvent(e.to_string())),
            },
        }
    }

    #[inline]
    fn unclassifiable(reason: UnclassifiableReason) -> Self {
        Self::Unclassifiable { reason }
    }

    /// Returns `true` for [`InboundMessage::Unclassifiable`].
    #[inline]
    #[must_use]
    pub fn is_unclassifiable(&self) -> bool {
        matches!(self, Self::Unclassifiable { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
