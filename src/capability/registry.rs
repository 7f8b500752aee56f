//! The process-wide capability registry.
//!
//! Built once at start-up and passed by reference into the resolver.
//! Read-only afterwards, so any number of runs may share it.

use std::collections::HashMap;
use std::sync::Arc;

use super::builtin::{CurrentTime, Echo, LiveBrowseFactory};
use super::{Capability, CapabilityFactory};

/// A registry entry: a shared singleton or a per-run factory.
#[derive(Clone)]
pub enum CapabilityEntry {
    Static(Arc<dyn Capability>),
    Factory(Arc<dyn CapabilityFactory>),
}

#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in capabilities.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(CurrentTime));
        registry.register_factory(Arc::new(LiveBrowseFactory));
        registry
    }

    /// Register a static capability, replacing any entry with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> &mut Self {
        let name = capability.name().to_string();
        if self.entries.insert(name.clone(), CapabilityEntry::Static(capability)).is_some() {
            tracing::debug!(capability = %name, "Replaced capability registration");
        }
        self
    }

    pub fn register_factory(&mut self, factory: Arc<dyn CapabilityFactory>) -> &mut Self {
        let name = factory.name().to_string();
        if self.entries.insert(name.clone(), CapabilityEntry::Factory(factory)).is_some() {
            tracing::debug!(capability = %name, "Replaced capability registration");
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&CapabilityEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
