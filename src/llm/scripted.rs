//! Scripted model service.
//!
//! Replays a fixed sequence of model turns. Capability calls are executed for
//! real against the request's capability set, so outputs, sub-actions and
//! live views behave exactly as they would behind a live model. Used for
//! dry runs and tests.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CapabilityCall, CapabilityResult, InvocationRequest, ModelError, ModelEvent, ModelService,
    ModelStream, StepEvent, Usage,
};

/// A capability call the script makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCall {
    pub capability: String,
    #[serde(default)]
    pub input: Value,
}

/// One model decision round. A turn without calls ends the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptTurn {
    #[serde(default)]
    pub calls: Vec<ScriptedCall>,
    #[serde(default)]
    pub text: String,
    /// Pause before the turn is produced
    #[serde(default)]
    pub delay_ms: u64,
}

impl ScriptTurn {
    pub fn call(capability: impl Into<String>, input: Value) -> Self {
        Self {
            calls: vec![ScriptedCall {
                capability: capability.into(),
                input,
            }],
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub turns: Vec<ScriptTurn>,
    /// Fail with a transport error instead of producing this turn.
    /// An index equal to the number of turns fails after the last turn.
    #[serde(default)]
    pub fail_at_turn: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    /// Model identifier reported on close
    #[serde(default)]
    pub model: Option<String>,
}

impl Script {
    pub fn new(turns: Vec<ScriptTurn>) -> Self {
        Self {
            turns,
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, turn: usize, error: impl Into<String>) -> Self {
        self.fail_at_turn = Some(turn);
        self.error = Some(error.into());
        self
    }

    /// Load a script from a JSON or YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        let script = if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML script {}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid JSON script {}", path.display()))?
        };
        Ok(script)
    }
}

/// Model service that replays a `Script`.
#[derive(Debug, Clone)]
pub struct ScriptedModelService {
    script: Script,
}

impl ScriptedModelService {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

#[async_trait]
impl ModelService for ScriptedModelService {
    async fn invoke(&self, request: InvocationRequest) -> Result<ModelStream, ModelError> {
        let Script {
            turns,
            fail_at_turn,
            error,
            model: scripted_model,
        } = self.script.clone();
        let failure = error.unwrap_or_else(|| "scripted model failure".to_string());

        let stream = async_stream::stream! {
            let InvocationRequest {
                prompt,
                seed_message,
                capabilities,
                max_steps,
                model,
                ..
            } = request;
            let turn_count = turns.len();
            let descriptor_units: u64 = capabilities
                .descriptors()
                .iter()
                .map(|d| estimate_units(&d.to_string()))
                .sum();
            let mut usage = Usage::default();
            let mut rounds = 0u32;
            let mut call_seq = 0usize;
            let mut stopped_early = false;

            for (turn_index, turn) in turns.into_iter().enumerate() {
                if fail_at_turn == Some(turn_index) {
                    yield Err(ModelError::Transport(failure.clone()));
                    return;
                }
                if turn.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(turn.delay_ms)).await;
                }

                let has_calls = !turn.calls.is_empty();
                if has_calls && rounds >= max_steps {
                    tracing::debug!("Scripted model reached max_steps={}", max_steps);
                    stopped_early = true;
                    break;
                }

                let mut event = StepEvent::text(turn.text.clone());
                let mut output_units = estimate_units(&turn.text);
                for call in turn.calls {
                    call_seq += 1;
                    let call_id = format!("call_{}", call_seq);
                    let output = capabilities.invoke(&call.capability, call.input.clone()).await;
                    output_units += estimate_units(&call.input.to_string());
                    event.capability_calls.push(CapabilityCall {
                        call_id: call_id.clone(),
                        capability: call.capability.clone(),
                        input: call.input,
                    });
                    event.capability_results.push(CapabilityResult {
                        call_id,
                        capability: call.capability,
                        output,
                    });
                }

                let input_units =
                    estimate_units(&prompt) + estimate_units(&seed_message) + descriptor_units;
                usage = usage.add(&Usage::new(input_units, output_units));
                yield Ok(ModelEvent::Step(event));

                if has_calls {
                    rounds += 1;
                } else {
                    stopped_early = true;
                    break;
                }
            }

            if !stopped_early && fail_at_turn.is_some_and(|n| n >= turn_count) {
                yield Err(ModelError::Transport(failure));
                return;
            }

            yield Ok(ModelEvent::Finished {
                usage,
                model: scripted_model.or(Some(model)),
            });
        };

        Ok(Box::pin(stream))
    }
}

/// Rough unit estimate: four characters per unit.
fn estimate_units(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
