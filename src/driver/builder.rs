//! Builder pattern for driver configuration.
//!
//! Provides a fluent API for configuring and creating [`Driver`] instances.
//!
//! # Example
//!
//! ```ignore
//! use webdriver_bidi::Driver;
//!
//! let driver = Driver::builder()
//!     .command_timeout(Duration::from_secs(10))
//!     .module(|driver| SessionModule::new(driver.downgrade()))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Connection, Transport, WebSocketConnection};

use super::core::Driver;
use super::registry::Module;

// ============================================================================
// Constants
// ============================================================================

/// Default time `execute_command` waits for a response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Constructs and registers one module on a freshly built driver.
type ModuleFactory = Box<dyn FnOnce(&Driver) + Send>;

// ============================================================================
// DriverBuilder
// ============================================================================

/// Builder for configuring a [`Driver`] instance.
///
/// Use [`Driver::builder()`] to create a new builder.
pub struct DriverBuilder {
    /// How long commands wait for a response.
    command_timeout: Duration,
    /// Transport to use instead of the default.
    transport: Option<Transport>,
    /// Connection for the default transport.
    connection: Option<Arc<dyn Connection>>,
    /// Modules registered at build time, in order.
    modules: Vec<ModuleFactory>,
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            transport: None,
            connection: None,
            modules: Vec::new(),
        }
    }
}

impl fmt::Debug for DriverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("command_timeout", &self.command_timeout)
            .field("transport", &self.transport)
            .field("connection", &self.connection.is_some())
            .field("modules", &self.modules.len())
            .finish()
    }
}

// ============================================================================
// DriverBuilder Implementation
// ============================================================================

impl DriverBuilder {
    /// Creates a builder with the default timeout and connection.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `execute_command` waits for a response.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Non-zero duration
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Uses `transport` instead of a default one.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the default transport over `connection`.
    #[inline]
    #[must_use]
    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Registers a module built from the new driver.
    ///
    /// Factories run in the order they were added, once the driver exists.
    #[must_use]
    pub fn module<M, F>(mut self, factory: F) -> Self
    where
        M: Module,
        F: FnOnce(&Driver) -> M + Send + 'static,
    {
        self.modules.push(Box::new(move |driver: &Driver| {
            driver.register_module(factory(driver));
        }));
        self
    }

    /// Builds the driver with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the command timeout is zero
    /// - [`Error::Config`] if both a transport and a connection were set
    pub fn build(self) -> Result<Driver> {
        self.validate_timeout()?;

        let Self {
            command_timeout,
            transport,
            connection,
            modules,
        } = self;

        let transport = match (transport, connection) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "Set either a transport or a connection, not both.\n\
                     Example: Driver::builder().connection(Arc::new(WebSocketConnection::new()))",
                ));
            }
            (Some(transport), None) => transport,
            (None, Some(connection)) => Transport::new(connection),
            (None, None) => Transport::new(Arc::new(WebSocketConnection::new())),
        };

        let driver = Driver::from_parts(command_timeout, transport)?;
        for factory in modules {
            factory(&driver);
        }

        Ok(driver)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl DriverBuilder {
    /// Validates the command timeout.
    fn validate_timeout(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(Error::config(
                "Command timeout must be greater than zero.\n\
                 Example: Driver::builder().command_timeout(Duration::from_secs(30))",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::testing::TestConnection;

    struct SessionModule {
        driver: crate::driver::WeakDriver,
    }

    impl Module for SessionModule {
        fn name(&self) -> &str {
            "session"
        }
    }

    #[test]
    fn test_default_timeout() {
        let builder = DriverBuilder::new();
        assert_eq!(builder.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert!(builder.transport.is_none());
        assert!(builder.connection.is_none());
    }

    #[test]
    fn test_command_timeout_sets_value() {
        let driver = DriverBuilder::new()
            .command_timeout(Duration::from_millis(250))
            .build()
            .expect("driver");
        assert_eq!(driver.command_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_build_fails_with_zero_timeout() {
        let err = DriverBuilder::new()
            .command_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_build_fails_with_transport_and_connection() {
        let err = DriverBuilder::new()
            .transport(Transport::new(Arc::new(TestConnection::new())))
            .connection(Arc::new(TestConnection::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_module_factories_run_at_build() {
        let driver = DriverBuilder::new()
            .module(|driver| SessionModule {
                driver: driver.downgrade(),
            })
            .build()
            .expect("driver");

        let module = driver.get_module::<SessionModule>("session").expect("module");
        assert!(module.driver.upgrade().is_ok());
    }

    #[test]
    fn test_custom_connection_is_used() {
        let connection = Arc::new(TestConnection::new());
        let driver = DriverBuilder::new()
            .connection(connection.clone())
            .build()
            .expect("driver");

        let used = driver.transport().connection();
        assert!(std::ptr::addr_eq(Arc::as_ptr(used), Arc::as_ptr(&connection)));
    }
}
