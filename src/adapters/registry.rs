//! Name → adapter lookup

use crate::adapters::{CardGridAdapter, JsonLdAdapter, SourceAdapter};
use crate::config::{AdapterKind, SourceEntry};
use crate::{ConfigError, ConfigResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Registered source adapters, keyed by source name
///
/// Tenants refer to sources by name in their settings; a name with no entry
/// here makes the job fail as an unsupported source.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the `[[source]]` entries of the service config
    ///
    /// # Returns
    ///
    /// * `Ok(AdapterRegistry)` - One adapter per entry
    /// * `Err(ConfigError)` - A base URL did not parse
    pub fn from_sources(sources: &[SourceEntry]) -> ConfigResult<Self> {
        let mut registry = Self::new();

        for source in sources {
            let base_url = Url::parse(&source.base_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("{} ({}): {}", source.base_url, source.name, e))
            })?;

            let adapter: Arc<dyn SourceAdapter> = match source.kind {
                AdapterKind::CardGrid => Arc::new(CardGridAdapter::new(&source.name, base_url)),
                AdapterKind::JsonLd => Arc::new(JsonLdAdapter::new(&source.name, base_url)),
            };
            registry.register(adapter);
        }

        Ok(registry)
    }

    /// Registers an adapter under its own name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Looks up the adapter for a source name
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered source names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
