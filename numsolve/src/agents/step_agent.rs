//! Tool-capable agent that executes one plan step.
//!
//! Each turn the model replies with a JSON object: `{"tool": ..., "input": ...}`
//! to call a tool, or `{"answer": ...}` to finish. A reply that is neither is
//! taken as the answer verbatim.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::json_block;
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::{PromptBuilder, StepPrompt, ToolSummary, TranscriptEntry};

use super::tools::Tool;

/// Everything a step agent sees for one plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRequest {
    pub index: usize,
    pub task: String,
    /// Full plan; steps before `index` carry `Result: ...` lines.
    pub annotated_plan: String,
    pub step: String,
}

/// Executes one plan step and returns its terminal text.
#[async_trait]
pub trait StepAgent: Send + Sync {
    async fn execute(&self, request: &StepRequest) -> Result<String>;
}

/// Parsed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Call { tool: String, input: String },
    Answer(String),
}

/// Interpret a model turn. Anything that is not a tool call or an
/// `answer` object is the answer itself.
pub fn parse_reply(text: &str) -> AgentReply {
    let object = json_block(text)
        .and_then(|block| serde_json::from_str::<Value>(block).ok())
        .filter(Value::is_object);
    let Some(object) = object else {
        return AgentReply::Answer(text.trim().to_string());
    };
    if let Some(answer) = object.get("answer") {
        return AgentReply::Answer(value_text(answer));
    }
    match object.get("tool").and_then(Value::as_str) {
        Some(tool) => AgentReply::Call {
            tool: tool.trim().to_string(),
            input: object.get("input").map(value_text).unwrap_or_default(),
        },
        None => AgentReply::Answer(text.trim().to_string()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Step agent driving a model through a bounded tool-use loop.
pub struct ToolAgent {
    generator: Arc<dyn TextGenerator>,
    prompts: PromptBuilder,
    tools: Vec<Box<dyn Tool>>,
    max_tool_calls: u32,
    observation_limit_bytes: usize,
}

impl ToolAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: PromptBuilder,
        tools: Vec<Box<dyn Tool>>,
        max_tool_calls: u32,
        observation_limit_bytes: usize,
    ) -> Self {
        Self {
            generator,
            prompts,
            tools,
            max_tool_calls,
            observation_limit_bytes,
        }
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    async fn observe(&self, tool: &str, input: &str) -> Result<String> {
        let Some(handler) = self.tools.iter().find(|t| t.name() == tool) else {
            warn!(tool, "unknown tool requested");
            return Ok(format!(
                "Error: unknown tool `{tool}`. Available: {}",
                self.tool_names().join(", ")
            ));
        };
        let observation = handler.invoke(input).await?;
        Ok(truncate_observation(observation, self.observation_limit_bytes))
    }
}

#[async_trait]
impl StepAgent for ToolAgent {
    #[instrument(skip_all, fields(step = request.index + 1))]
    async fn execute(&self, request: &StepRequest) -> Result<String> {
        let summaries: Vec<ToolSummary> = self.tools.iter().map(|t| t.summary()).collect();
        let mut transcript: Vec<TranscriptEntry> = Vec::new();

        loop {
            let calls_left = self.max_tool_calls.saturating_sub(transcript.len() as u32);
            let prompt = self.prompts.step(&StepPrompt {
                task: &request.task,
                annotated_plan: &request.annotated_plan,
                step: &request.step,
                tools: &summaries,
                transcript: &transcript,
                calls_left,
            })?;

            let Some(text) = generate_or_degrade(self.generator.as_ref(), &prompt, "step").await?
            else {
                return Ok(last_observation_or(&transcript, || {
                    format!("Step not executed: {}", request.step)
                }));
            };

            match parse_reply(&text) {
                AgentReply::Answer(answer) => {
                    debug!(tool_calls = transcript.len(), "step answered");
                    return Ok(answer);
                }
                AgentReply::Call { tool, input } if calls_left > 0 => {
                    info!(%tool, calls_left, "tool call");
                    let observation = self.observe(&tool, &input).await?;
                    transcript.push(TranscriptEntry {
                        tool,
                        input,
                        observation,
                    });
                }
                AgentReply::Call { tool, .. } => {
                    warn!(%tool, "tool call budget exhausted, ending step");
                    return Ok(last_observation_or(&transcript, || text.trim().to_string()));
                }
            }
        }
    }
}

fn last_observation_or(transcript: &[TranscriptEntry], fallback: impl FnOnce() -> String) -> String {
    transcript
        .last()
        .map(|entry| entry.observation.clone())
        .unwrap_or_else(fallback)
}

fn truncate_observation(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n[truncated]");
    text
}
