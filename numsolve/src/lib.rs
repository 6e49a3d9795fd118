//! Numerical-methods problem solver.
//!
//! A task in natural language goes through a fixed pipeline: classify the
//! problem, propose candidate methods, validate each candidate by running
//! synthesized code in a sandbox, select the best one, plan its application,
//! execute the plan step by step, and synthesize a final answer.
//!
//! - **[`core`]**: Pure, deterministic logic (metric parsing, selection,
//!   pipeline state, heuristics). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting capabilities (text generation, sandboxed
//!   execution, configuration, prompt rendering, reports).
//! - **[`agents`]**: Stages that talk to the text generator.
//!
//! Orchestration modules ([`validate`], [`step`], [`looping`], [`pipeline`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod healing;
pub mod io;
pub mod logging;
pub mod looping;
pub mod pipeline;
pub mod step;
pub mod synth;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
