//! Capabilities - named, invokable units of external action.
//!
//! The engine never looks inside a capability. It resolves the names a task
//! declares against an explicit `CapabilityRegistry` and hands the resulting
//! `CapabilitySet` to the model service.

mod builtin;
mod registry;
mod resolver;
mod sub_action;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

pub use builtin::{CurrentTime, Echo, LiveBrowse};
pub use registry::{CapabilityEntry, CapabilityRegistry};
pub use resolver::{resolve, ResolveError};
pub use sub_action::{SubActionRecorder, SubActionSink};

/// An executable capability exposed to the model.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name the model calls the capability by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted input.
    fn parameters_schema(&self) -> Value;

    /// Run the capability. The output shape is opaque to the engine.
    async fn invoke(&self, input: Value) -> anyhow::Result<Value>;
}

/// A capability that must be built per run, bound to the run's sub-action
/// channel.
pub trait CapabilityFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Build a fresh instance. With no sink the factory may return a
    /// callback-less instance or `None` to omit the capability.
    fn bind(&self, sub_actions: Option<SubActionSink>) -> Option<Arc<dyn Capability>>;
}

/// The capabilities resolved for one run, in declaration order.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: Vec<Arc<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lenient resolution without a sub-action channel.
    pub fn from_registry(registry: &CapabilityRegistry, names: &[String]) -> Self {
        match resolve(registry, names, None, false) {
            Ok(set) => set,
            Err(_) => Self::new(),
        }
    }

    pub(crate) fn push(&mut self, capability: Arc<dyn Capability>) {
        self.entries.push(capability);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries.iter().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Function-style descriptors for every capability in the set.
    ///
    /// This is the tool list a model adapter sends with the session; the
    /// scripted service counts it towards input usage.
    pub fn descriptors(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|c| {
                json!({
                    "type": "function",
                    "function": {
                        "name": c.name(),
                        "description": c.description(),
                        "parameters": c.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Invoke a capability by name.
    ///
    /// Failures never escape: they come back as an `{"error": ...}` output
    /// the model can react to.
    pub async fn invoke(&self, name: &str, input: Value) -> Value {
        let Some(capability) = self.get(name) else {
            tracing::warn!(capability = name, "Model called a capability outside the run's set");
            return json!({ "error": format!("Unknown capability: {}", name) });
        };

        match capability.invoke(input).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(capability = name, "Capability failed: {}", e);
                json!({ "error": e.to_string() })
            }
        }
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|c| c.name())).finish()
    }
}
