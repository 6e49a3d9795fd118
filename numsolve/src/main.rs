//! Numerical-methods problem solver CLI.
//!
//! `solve` runs the whole pipeline on a natural-language task; `validate`
//! only evaluates candidate methods; `init-config` writes `numsolve.toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use numsolve::agents::step_agent::ToolAgent;
use numsolve::agents::tools::{SandboxTool, SearchTool, Tool};
use numsolve::core::types::StructuredResult;
use numsolve::exit_codes;
use numsolve::io::config::{DEFAULT_CONFIG_PATH, SolverConfig, load_config, write_config};
use numsolve::io::generator::{CommandGenerator, TextGenerator};
use numsolve::io::prompt::PromptBuilder;
use numsolve::io::report::write_report;
use numsolve::io::sandbox::{PythonSandbox, Sandbox};
use numsolve::logging;
use numsolve::pipeline::{Pipeline, StageEvent};

#[derive(Parser)]
#[command(
    name = "numsolve",
    version,
    about = "Solve numerical problems by validating candidate methods in a sandbox"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and print the final answer.
    Solve {
        /// Problem statement in natural language.
        task: String,
        /// Write the terminal pipeline state as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate candidate methods and print their results as JSON.
    Validate {
        task: String,
        /// Method to validate (repeatable). Proposed automatically when omitted.
        #[arg(short, long = "method")]
        methods: Vec<String>,
    },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Production capabilities built from config.
struct Capabilities {
    generator: Arc<dyn TextGenerator>,
    sandbox: Arc<dyn Sandbox>,
    step_agent: ToolAgent,
}

impl Capabilities {
    fn from_config(config: &SolverConfig) -> Result<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(CommandGenerator::new(&config.generator)?);
        let sandbox: Arc<dyn Sandbox> = Arc::new(PythonSandbox::new(config.sandbox.clone()));
        let prompts = PromptBuilder::new(config.prompt_budget_bytes);

        let mut tools: Vec<Box<dyn Tool>> = vec![Box::new(SandboxTool::new(
            Arc::clone(&sandbox),
            Arc::clone(&generator),
            prompts,
            config.validation.max_install_attempts,
        ))];
        if let Some(search) =
            SearchTool::from_config(&config.search, config.agent.observation_limit_bytes)
        {
            tools.push(Box::new(search));
        }

        let step_agent = ToolAgent::new(
            Arc::clone(&generator),
            prompts,
            tools,
            config.agent.max_tool_calls,
            config.agent.observation_limit_bytes,
        );
        Ok(Self {
            generator,
            sandbox,
            step_agent,
        })
    }

    fn pipeline<'a>(&'a self, config: &'a SolverConfig) -> Pipeline<'a> {
        Pipeline {
            generator: self.generator.as_ref(),
            sandbox: self.sandbox.as_ref(),
            step_agent: &self.step_agent,
            config,
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Solve { task, report } => cmd_solve(&cli.config, &task, report.as_deref()).await,
        Command::Validate { task, methods } => cmd_validate(&cli.config, &task, &methods).await,
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

async fn cmd_solve(config_path: &Path, task: &str, report: Option<&Path>) -> Result<i32> {
    let task = non_empty_task(task)?;
    let config = load_config(config_path)?;
    let capabilities = Capabilities::from_config(&config)?;

    let outcome = capabilities
        .pipeline(&config)
        .run(task, print_event)
        .await?;

    if let Some(path) = report {
        write_report(path, &outcome.state, outcome.degraded)?;
    }
    if let Some(answer) = &outcome.state.final_response {
        println!("{answer}");
    }
    Ok(if outcome.degraded {
        exit_codes::DEGRADED
    } else {
        exit_codes::OK
    })
}

async fn cmd_validate(config_path: &Path, task: &str, methods: &[String]) -> Result<i32> {
    let task = non_empty_task(task)?;
    let config = load_config(config_path)?;
    let capabilities = Capabilities::from_config(&config)?;

    let report = capabilities
        .pipeline(&config)
        .validate_only(task, methods)
        .await?;

    let mut payload = serde_json::to_string_pretty(&report)?;
    payload.push('\n');
    print!("{payload}");
    Ok(if report.degraded {
        exit_codes::DEGRADED
    } else {
        exit_codes::OK
    })
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &SolverConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn non_empty_task(task: &str) -> Result<&str> {
    let task = task.trim();
    if task.is_empty() {
        bail!("task must not be empty");
    }
    Ok(task)
}

/// Progress lines go to stderr so stdout carries only the answer.
fn print_event(event: StageEvent<'_>) {
    match event {
        StageEvent::Classified(classification) => eprintln!(
            "[classify] category={} form={}",
            classification.category.as_deref().unwrap_or("unknown"),
            classification.short_form.as_deref().unwrap_or("-"),
        ),
        StageEvent::Researched(research) => {
            eprintln!("[research] {}", research.candidate_methods.join(", "));
        }
        StageEvent::Validated {
            results,
            best,
            degraded,
        } => {
            for result in results {
                eprintln!("[validate] {}", result_line(result));
            }
            if let Some(best) = best {
                let tier = if degraded { " (fallback)" } else { "" };
                eprintln!("[select] {}{tier}", best.method);
            }
        }
        StageEvent::Planned(plan) => eprintln!("[plan] {} steps", plan.len()),
        StageEvent::StepFinished(step) => {
            eprintln!("[step {}] {}", step.index + 1, step.step);
        }
        StageEvent::Finished(_) => eprintln!("[final] done"),
    }
}

fn result_line(result: &StructuredResult) -> String {
    let status = if result.success { "ok" } else { "failed" };
    let value = match &result.result {
        Value::Null => String::new(),
        other => format!(" result={other}"),
    };
    let residual = result
        .residual
        .map(|r| format!(" residual={r:e}"))
        .unwrap_or_default();
    format!("{} {status}{value}{residual}", result.method)
}
