//! Protocol module registry.
//!
//! Modules are registered by name and recovered by name plus expected type.
//! Each entry is stored type-erased and checked with a downcast at lookup.

// ============================================================================
// Imports
// ============================================================================

use std::any::{Any, type_name};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

// ============================================================================
// Module
// ============================================================================

/// A protocol module exposing commands and events for one protocol domain.
///
/// Modules call [`Driver::execute_command`](super::Driver::execute_command)
/// for their commands and [`Driver::register_event`](super::Driver::register_event)
/// for their events.
///
/// # Example
///
/// ```ignore
/// struct SessionModule {
///     driver: WeakDriver,
/// }
///
/// impl Module for SessionModule {
///     fn name(&self) -> &str {
///         "session"
///     }
/// }
/// ```
pub trait Module: Any + Send + Sync {
    /// Name the module is registered under.
    fn name(&self) -> &str;
}

// ============================================================================
// ModuleRegistry
// ============================================================================

type ModuleEntry = Arc<dyn Any + Send + Sync>;

/// Name-keyed module storage.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: RwLock<FxHashMap<String, ModuleEntry>>,
}

impl ModuleRegistry {
    /// Stores `module` under its name.
    ///
    /// Returns `true` if a module of the same name was replaced.
    pub(crate) fn register<M: Module>(&self, module: Arc<M>) -> bool {
        let name = module.name().to_owned();
        let entry: ModuleEntry = module;
        self.modules.write().insert(name, entry).is_some()
    }

    /// Looks up the module named `name` as a `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotRegistered`] if no module has that name
    /// - [`Error::ModuleTypeMismatch`] if the module is not a `T`
    pub(crate) fn get<T: Module>(&self, name: &str) -> Result<Arc<T>> {
        let entry = self
            .modules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::module_not_registered(name))?;

        entry
            .downcast::<T>()
            .map_err(|_| Error::module_type_mismatch(name, type_name::<T>()))
    }

    /// Returns `true` if a module named `name` is registered.
    #[inline]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Returns the registered module names, sorted.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AlphaModule;

    impl Module for AlphaModule {
        fn name(&self) -> &str {
            "alpha"
        }
    }

    #[derive(Debug)]
    struct OtherAlpha(u32);

    impl Module for OtherAlpha {
        fn name(&self) -> &str {
            "alpha"
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ModuleRegistry::default();
        assert!(!registry.register(Arc::new(AlphaModule)));

        assert!(registry.contains("alpha"));
        assert!(registry.get::<AlphaModule>("alpha").is_ok());
        assert_eq!(registry.names(), vec!["alpha"]);
    }

    #[test]
    fn test_get_unregistered() {
        let registry = ModuleRegistry::default();
        let err = registry.get::<AlphaModule>("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Module 'missing' is not registered with this driver"
        );
    }

    #[test]
    fn test_get_wrong_type() {
        let registry = ModuleRegistry::default();
        registry.register(Arc::new(AlphaModule));

        let err = registry.get::<OtherAlpha>("alpha").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with(
            "Module 'alpha' is registered with this driver, but the module object is not of type"
        ));
        assert!(message.ends_with("OtherAlpha"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = ModuleRegistry::default();
        registry.register(Arc::new(AlphaModule));
        assert!(registry.register(Arc::new(OtherAlpha(7))));

        assert_eq!(registry.get::<OtherAlpha>("alpha").map(|m| m.0).ok(), Some(7));
        assert!(registry.get::<AlphaModule>("alpha").is_err());
    }
}
