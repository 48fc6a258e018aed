//! Backend registry.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::backend::{Backend, SharedBackend, lock_backend};
use crate::config::ConfigError;

/// Named collection of backends.
///
/// Owned by the composition root and handed to monitor sets when a backend is
/// attached. Iteration is in name order.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<String, SharedBackend>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own name.
    ///
    /// # Errors
    /// Returns `ConfigError::DuplicateBackend` if the name is taken.
    pub fn register<B: Backend>(&mut self, backend: B) -> Result<SharedBackend, ConfigError> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(ConfigError::DuplicateBackend(name));
        }
        let shared: SharedBackend = Arc::new(Mutex::new(backend));
        self.backends.insert(name.clone(), Arc::clone(&shared));
        tracing::debug!(backend = %name, "Backend registered");
        Ok(shared)
    }

    /// Remove a backend. Monitor sets that already hold it keep their reference.
    pub fn remove(&mut self, name: &str) -> Option<SharedBackend> {
        self.backends.remove(name)
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Report every backend.
    pub fn report(&self, out: &mut dyn Write, indent: usize) -> io::Result<()> {
        for backend in self.backends.values() {
            lock_backend(backend).report(out, indent)?;
        }
        Ok(())
    }
}
