use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryAdapter;

/// Constructor for one backend: parses its settings and connects.
pub type AdapterFactory = fn(&StoreConfig) -> StoreResult<Arc<dyn Adapter>>;

/// Explicit mapping from backend name to constructor.
///
/// Backends are registered by the embedding application at startup; nothing
/// is discovered at runtime. The in-memory backend is always present.
#[derive(Clone)]
pub struct AdapterRegistry {
    factories: BTreeMap<&'static str, AdapterFactory>,
}

impl AdapterRegistry {
    /// A registry holding only the `memory` backend.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(InMemoryAdapter::NAME, |_| Ok(Arc::new(InMemoryAdapter::new())));
        registry
    }

    /// Register (or replace) a backend.
    pub fn register(&mut self, name: &'static str, factory: AdapterFactory) -> &mut Self {
        self.factories.insert(name, factory);
        self
    }

    pub fn with(mut self, name: &'static str, factory: AdapterFactory) -> Self {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Open the backend selected by `config.backend`.
    pub fn open(&self, config: &StoreConfig) -> StoreResult<Arc<dyn Adapter>> {
        let factory = self.factories.get(config.backend.as_str()).ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "unknown backend {:?} (known: {})",
                config.backend,
                self.names().join(", ")
            ))
        })?;
        let adapter = factory(config)?;
        tracing::info!(backend = adapter.name(), "opened storage adapter");
        Ok(adapter)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
