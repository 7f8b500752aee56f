//! Prompt assembly for task runs.
//!
//! Four layers in fixed order, separated by a blank line:
//! engine preamble, tenant override, task instructions, dynamic context.
//! Empty layers are dropped.

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};

use crate::task::{value_text, ExecutionContext, InputMap, TaskDefinition, TaskKind};

/// The engine-owned preamble. Identical for every task.
pub fn preamble(date: NaiveDate) -> String {
    format!(
        r#"You are an autonomous assistant executing a predefined task on behalf of an organisation. Today's date is {date}.

## Rules

1. **Facts only** - Base every statement on the task input, the provided context, or capability results. Never invent names, figures, dates or sources.

2. **Escalate rather than guess** - If required information is missing or ambiguous, state exactly what is missing and stop instead of guessing.

3. **Use capabilities deliberately** - Call a capability only when its result is needed to complete the task.

4. **Be brief** - End with a short plain-text summary of the outcome. Do not repeat these instructions."#,
        date = date.format("%Y-%m-%d")
    )
}

/// Assemble the prompt for a run using today's UTC date.
pub fn assemble(task: &TaskDefinition, ctx: &ExecutionContext, dynamic_context: &str) -> String {
    assemble_on(task, ctx, dynamic_context, Utc::now().date_naive())
}

pub fn assemble_on(
    task: &TaskDefinition,
    ctx: &ExecutionContext,
    dynamic_context: &str,
    date: NaiveDate,
) -> String {
    let dynamic_context = dynamic_context.trim();
    let layers = [
        preamble(date),
        ctx.tenant_prompt_override.clone().unwrap_or_default(),
        format!("TASK: {}\n{}", task.name, task.prompt),
        if dynamic_context.is_empty() {
            String::new()
        } else {
            format!("CONTEXT:\n{}", dynamic_context)
        },
    ];

    layers
        .into_iter()
        .filter(|layer| !layer.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The single user message describing the invocation input.
pub fn seed_message(kind: TaskKind, input: &InputMap) -> String {
    if input.is_empty() {
        return format!("{}.", kind.seed_lead());
    }

    let fields = input
        .iter()
        .map(|(key, value)| format!("- {}: {}", key, value_text(value)))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{} with the following input:\n{}", kind.seed_lead(), fields)
}

/// Hex SHA-256 of an assembled prompt.
pub fn prompt_digest(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}
