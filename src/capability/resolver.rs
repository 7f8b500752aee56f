//! Resolve declared capability names into a per-run `CapabilitySet`.

use thiserror::Error;

use super::registry::{CapabilityEntry, CapabilityRegistry};
use super::sub_action::SubActionSink;
use super::CapabilitySet;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown capabilities: {}", .0.join(", "))]
pub struct ResolveError(pub Vec<String>);

/// Resolve `names` against `registry`, in declaration order.
///
/// Factories are bound to `sub_actions` when it is present. Unknown names
/// are logged and omitted; with `strict` set they fail the resolution
/// instead. No state is shared between calls.
pub fn resolve(
    registry: &CapabilityRegistry,
    names: &[String],
    sub_actions: Option<&SubActionSink>,
    strict: bool,
) -> Result<CapabilitySet, ResolveError> {
    let mut set = CapabilitySet::new();
    let mut unknown = Vec::new();

    for name in names {
        if set.contains(name) {
            continue;
        }
        match registry.lookup(name) {
            Some(CapabilityEntry::Static(capability)) => set.push(capability.clone()),
            Some(CapabilityEntry::Factory(factory)) => match factory.bind(sub_actions.cloned()) {
                Some(capability) => set.push(capability),
                None => {
                    tracing::debug!(capability = %name, "Factory produced no instance without a sub-action sink");
                }
            },
            None => {
                tracing::warn!(capability = %name, "Unknown capability declared by task; omitting it");
                unknown.push(name.clone());
            }
        }
    }

    if strict && !unknown.is_empty() {
        return Err(ResolveError(unknown));
    }
    Ok(set)
}
