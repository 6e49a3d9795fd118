//! Scripted fakes for the external capabilities.
//!
//! None of these spawn processes; every call is recorded so tests can assert
//! on prompts, executed code, and install commands.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::agents::step_agent::{StepAgent, StepRequest};
use crate::io::generator::{GeneratorUnavailable, TextGenerator};
use crate::io::sandbox::{Execution, Sandbox, SandboxSession, SandboxUnavailable};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<String>,
    sticky: bool,
}

/// Generator answering by prompt substring.
///
/// Rules are checked in insertion order; the first rule whose needle occurs in
/// the prompt and still has a response wins. Unmatched prompts fail with a
/// non-fatal error, which sends callers down their fallback path.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
    unavailable: bool,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with [`GeneratorUnavailable`].
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Queue one response for prompts containing `needle`.
    pub fn respond(self, needle: &str, text: &str) -> Self {
        self.push(needle, text, false)
    }

    /// Answer every prompt containing `needle` with `text`.
    pub fn always(self, needle: &str, text: &str) -> Self {
        self.push(needle, text, true)
    }

    fn push(self, needle: &str, text: &str, sticky: bool) -> Self {
        {
            let mut rules = lock(&self.rules);
            match rules.iter_mut().find(|r| r.needle == needle && r.sticky == sticky) {
                Some(rule) => rule.responses.push_back(text.to_string()),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    responses: VecDeque::from([text.to_string()]),
                    sticky,
                }),
            }
        }
        self
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        lock(&self.prompts)
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());
        if self.unavailable {
            return Err(GeneratorUnavailable {
                reason: "scripted generator is offline".to_string(),
            }
            .into());
        }
        let mut rules = lock(&self.rules);
        let rule = rules
            .iter_mut()
            .find(|r| !r.responses.is_empty() && prompt.contains(&r.needle));
        match rule {
            Some(rule) if rule.sticky => Ok(rule.responses[0].clone()),
            Some(rule) => Ok(rule.responses.pop_front().unwrap_or_default()),
            None => Err(anyhow!("no scripted response")),
        }
    }
}

#[derive(Debug, Default)]
struct SandboxScript {
    executions: VecDeque<Execution>,
    runs: Vec<String>,
    installs: Vec<String>,
    sessions: usize,
    unavailable: bool,
}

/// Sandbox replaying queued executions across all of its sessions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSandbox {
    script: Arc<Mutex<SandboxScript>>,
}

impl ScriptedSandbox {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self {
            script: Arc::new(Mutex::new(SandboxScript {
                executions: executions.into(),
                ..SandboxScript::default()
            })),
        }
    }

    /// Opening a session fails with [`SandboxUnavailable`].
    pub fn unavailable() -> Self {
        let sandbox = Self::default();
        lock(&sandbox.script).unavailable = true;
        sandbox
    }

    /// A session sharing this sandbox's script, without counting an open.
    pub fn session(&self) -> ScriptedSession {
        ScriptedSession {
            script: Arc::clone(&self.script),
        }
    }

    /// Code passed to `run`, in order.
    pub fn runs(&self) -> Vec<String> {
        lock(&self.script).runs.clone()
    }

    pub fn installs(&self) -> Vec<String> {
        lock(&self.script).installs.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        lock(&self.script).sessions
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn open_session(&self) -> Result<Box<dyn SandboxSession>> {
        let mut script = lock(&self.script);
        if script.unavailable {
            return Err(SandboxUnavailable {
                reason: "scripted sandbox is offline".to_string(),
            }
            .into());
        }
        script.sessions += 1;
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    script: Arc<Mutex<SandboxScript>>,
}

#[async_trait]
impl SandboxSession for ScriptedSession {
    async fn run(&mut self, code: &str) -> Result<Execution> {
        let mut script = lock(&self.script);
        script.runs.push(code.to_string());
        Ok(script
            .executions
            .pop_front()
            .unwrap_or_else(|| Execution::failure("", "no scripted execution left")))
    }

    async fn install(&mut self, command: &str) {
        lock(&self.script).installs.push(command.to_string());
    }
}

/// Step agent returning queued answers, else `done: <step>`.
#[derive(Debug, Default)]
pub struct ScriptedStepAgent {
    answers: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<StepRequest>>,
}

impl ScriptedStepAgent {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every step request received, in order.
    pub fn requests(&self) -> Vec<StepRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl StepAgent for ScriptedStepAgent {
    async fn execute(&self, request: &StepRequest) -> Result<String> {
        lock(&self.requests).push(request.clone());
        Ok(lock(&self.answers)
            .pop_front()
            .unwrap_or_else(|| format!("done: {}", request.step)))
    }
}
