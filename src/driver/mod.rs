//! Driver module.
//!
//! This module provides the application-facing entry point: command
//! execution, protocol modules, and typed event subscriptions.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Driver`] | Command execution and event publication |
//! | [`WeakDriver`] | Non-owning handle for modules |
//! | [`DriverBuilder`] | Fluent configuration builder |
//! | [`Module`] | Protocol module registered by name |
//!
//! # Example
//!
//! ```ignore
//! use webdriver_bidi::{Driver, Result};
//!
//! # async fn example() -> Result<()> {
//! let driver = Driver::builder()
//!     .command_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let entries = driver.register_event::<EntryAdded>("log.entryAdded")?;
//! entries.add_sync_observer(|info| println!("{}", info.data.text))?;
//!
//! driver.start("ws://127.0.0.1:9222/session").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Event name to payload type bindings.
mod binding;

/// Fluent builder pattern for driver configuration.
pub mod builder;

/// Core driver implementation.
pub mod core;

/// Protocol module registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_COMMAND_TIMEOUT, DriverBuilder};
pub use core::{Driver, WeakDriver};
pub use registry::Module;
