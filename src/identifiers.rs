//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing command ids with observer ids.
//!
//! | Type | Scope | Source |
//! |------|-------|--------|
//! | [`CommandId`] | One transport | Sequential counter per transport |
//! | [`ObserverId`] | Process | Global atomic counter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// CommandId
// ============================================================================

/// Identifier correlating a command with its response.
///
/// Assigned sequentially by the transport, starting at 1. Ids are never
/// reused within a transport's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw command id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CommandId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// CommandIdGenerator
// ============================================================================

/// Sequential command id source owned by one transport.
#[derive(Debug, Default)]
pub(crate) struct CommandIdGenerator {
    last: AtomicU64,
}

impl CommandIdGenerator {
    /// Returns the next id.
    #[inline]
    pub(crate) fn next(&self) -> CommandId {
        CommandId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ============================================================================
// ObserverId
// ============================================================================

/// Global counter for observer ids.
static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one event observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Allocates the next observer id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
