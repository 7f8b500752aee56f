//! Task module - static task definitions and per-invocation context.
//!
//! A `TaskDefinition` is loaded once and never mutated; an `ExecutionContext`
//! is built for every invocation. Agents and skills share the same definition
//! type and differ only by `TaskKind`.

mod catalogue;
mod context;
mod definition;
mod input;

pub use catalogue::{CatalogueError, TaskCatalogue};
pub(crate) use context::value_text;
pub use context::{DynamicContext, ExecutionContext, InputMap, TemplateContext};
pub use definition::{OversightMode, TaskDefinition, TaskKind, TaskLimits, TriggerKind};
pub use input::{InputContract, InputError, InputField};
