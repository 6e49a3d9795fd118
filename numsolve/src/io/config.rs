//! Solver configuration stored in `numsolve.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "numsolve.toml";

/// Hard cap on candidates validated per run.
pub const MAX_CANDIDATES: usize = 6;

/// Solver configuration (TOML).
///
/// Missing fields default to the values below; a missing file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock budget for one whole pipeline run, in seconds.
    pub run_timeout_secs: u64,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    pub generator: GeneratorConfig,
    pub sandbox: SandboxConfig,
    pub validation: ValidationConfig,
    pub agent: AgentConfig,
    pub search: SearchConfig,
}

/// Command-line model client. The prompt is written to its stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate model output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Disposable Python workspace used for candidate execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter to run generated code with.
    pub python: String,
    pub timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Candidates beyond this count are not validated. At most [`MAX_CANDIDATES`].
    pub max_candidates: usize,
    /// Executions allowed per candidate while recovering from missing modules.
    pub max_install_attempts: u32,
    /// Tolerance requested from generated and fallback code.
    pub tol: f64,
    /// Iteration cap requested from generated and fallback code.
    pub maxiter: u32,
    /// Candidates validated at once. Each gets its own sandbox session.
    pub concurrency: usize,
}

/// Tool-using step agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Tool invocations allowed per plan step before an answer is demanded.
    pub max_tool_calls: u32,
    /// Truncate tool observations beyond this many bytes.
    pub observation_limit_bytes: usize,
}

/// Optional lookup tool; the query is appended as the last argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: 60 * 60,
            prompt_budget_bytes: 40_000,
            generator: GeneratorConfig::default(),
            sandbox: SandboxConfig::default(),
            validation: ValidationConfig::default(),
            agent: AgentConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string(), "-m".to_string(), "gemini-2.0-flash".to_string()],
            timeout_secs: 120,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 120,
            install_timeout_secs: 300,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CANDIDATES,
            max_install_attempts: 5,
            tol: 1e-6,
            maxiter: 200,
            concurrency: 1,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 6,
            observation_limit_bytes: 8_000,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if self.sandbox.python.trim().is_empty() {
            return Err(anyhow!("sandbox.python must not be empty"));
        }
        if self.sandbox.timeout_secs == 0 || self.sandbox.install_timeout_secs == 0 {
            return Err(anyhow!("sandbox timeouts must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if self.validation.max_candidates == 0 || self.validation.max_candidates > MAX_CANDIDATES {
            return Err(anyhow!(
                "validation.max_candidates must be between 1 and {MAX_CANDIDATES}"
            ));
        }
        if self.validation.max_install_attempts == 0 {
            return Err(anyhow!("validation.max_install_attempts must be > 0"));
        }
        if !(self.validation.tol.is_finite() && self.validation.tol > 0.0) {
            return Err(anyhow!("validation.tol must be a positive number"));
        }
        if self.validation.maxiter == 0 {
            return Err(anyhow!("validation.maxiter must be > 0"));
        }
        if self.validation.concurrency == 0 {
            return Err(anyhow!("validation.concurrency must be > 0"));
        }
        if self.agent.observation_limit_bytes == 0 {
            return Err(anyhow!("agent.observation_limit_bytes must be > 0"));
        }
        if !self.search.command.is_empty() && self.search.timeout_secs == 0 {
            return Err(anyhow!("search.timeout_secs must be > 0 when search.command is set"));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl SearchConfig {
    pub fn is_enabled(&self) -> bool {
        self.command
            .first()
            .is_some_and(|program| !program.trim().is_empty())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<SolverConfig> {
    if !path.exists() {
        let cfg = SolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    fs::write(tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
