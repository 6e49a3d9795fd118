//! End-to-end pipeline runs against scripted capabilities.
//!
//! Each test drives `Pipeline::run` from classification to the final answer
//! and checks the terminal state, the recorded sandbox traffic, and the
//! prompts the generator saw.

use numsolve::core::state::Stage;
use numsolve::io::config::{SolverConfig, ValidationConfig};
use numsolve::io::is_fatal;
use numsolve::io::sandbox::Execution;
use numsolve::pipeline::Pipeline;
use numsolve::test_support::{ScriptedGenerator, ScriptedSandbox, ScriptedStepAgent};

const TASK: &str = "Find the root. Equation: x^3 - x - 1 = 0 in (1, 2)";

fn config(max_candidates: usize) -> SolverConfig {
    SolverConfig {
        validation: ValidationConfig {
            max_candidates,
            ..ValidationConfig::default()
        },
        ..SolverConfig::default()
    }
}

/// Missing modules are installed one by one until the candidate runs.
///
/// Execution sequence for the only candidate:
/// 1. `No module named 'scipy'` → `pip install scipy`
/// 2. `No module named 'sympy'` → `pip install sympy`
/// 3. `No module named 'mpmath'` → `pip install mpmath`
/// 4. success with a result record
#[tokio::test]
async fn self_healing_installs_each_missing_module() {
    let generator = ScriptedGenerator::new()
        .respond("### Plan Contract", r#"{"steps": ["Iterate until converged"]}"#)
        .respond("### Final Answer Contract", "x ≈ 1.324718");
    let sandbox = ScriptedSandbox::new(vec![
        Execution::failure("", "ModuleNotFoundError: No module named 'scipy'"),
        Execution::failure("", "ModuleNotFoundError: No module named 'sympy'"),
        Execution::failure("", "ModuleNotFoundError: No module named 'mpmath'"),
        Execution::success(
            r#"{"method":"Bisection","success":true,"iterations":21,"result":1.324718,"residual":2.1e-7}"#,
        ),
    ]);
    let agent = ScriptedStepAgent::new(&["x = 1.324718"]);
    let config = config(1);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let outcome = pipeline.run(TASK, |_| {}).await.expect("run");

    assert_eq!(
        sandbox.installs(),
        ["pip install scipy", "pip install sympy", "pip install mpmath"]
    );
    assert_eq!(sandbox.runs().len(), 4);
    assert_eq!(sandbox.sessions_opened(), 1);
    let best = outcome.state.best_algorithm.as_ref().expect("best");
    assert!(best.success);
    assert_eq!(best.method, "Bisection");
    assert!(!outcome.degraded);
    assert_eq!(outcome.state.past_steps(), ["x = 1.324718"]);
    assert_eq!(outcome.state.final_response.as_deref(), Some("x ≈ 1.324718"));
}

/// A plan without steps goes straight from planning to the final answer.
#[tokio::test]
async fn empty_plan_finalizes_without_steps() {
    let generator = ScriptedGenerator::new()
        .respond("### Plan Contract", r#"{"steps": []}"#)
        .respond("### Final Answer Contract", "Nothing to execute.");
    let sandbox = ScriptedSandbox::new(vec![Execution::success(
        r#"{"method":"Bisection","success":true,"iterations":21,"residual":2.1e-7}"#,
    )]);
    let agent = ScriptedStepAgent::default();
    let config = config(1);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let mut stages = Vec::new();
    let outcome = pipeline
        .run(TASK, |event| stages.push(event.stage()))
        .await
        .expect("run");

    assert_eq!(stages[3..], [Stage::Plan, Stage::Final]);
    assert!(agent.requests().is_empty());
    assert!(outcome.state.past_steps().is_empty());
    assert!(outcome.state.plan.as_ref().expect("plan").is_empty());
    assert_eq!(outcome.state.final_response.as_deref(), Some("Nothing to execute."));
}

/// Every step sees the results of the steps before it, and the final
/// answer prompt sees all of them.
#[tokio::test]
async fn steps_accumulate_into_the_final_prompt() {
    let generator = ScriptedGenerator::new()
        .respond(
            "### Plan Contract",
            r#"{"steps": ["Bracket the root", "Bisect to tolerance"]}"#,
        )
        .respond("### Final Answer Contract", "x = 1.3247");
    let sandbox = ScriptedSandbox::new(vec![Execution::success(
        r#"{"method":"Bisection","success":true,"iterations":21,"residual":2.1e-7}"#,
    )]);
    let agent = ScriptedStepAgent::new(&["f(1) < 0 < f(2)", "x = 1.3247"]);
    let config = config(1);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let outcome = pipeline.run(TASK, |_| {}).await.expect("run");

    let requests = agent.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].step, "Bisect to tolerance");
    assert!(requests[1].annotated_plan.contains("Result: f(1) < 0 < f(2)"));
    assert_eq!(outcome.state.past_steps(), ["f(1) < 0 < f(2)", "x = 1.3247"]);

    let final_prompts = generator.prompts_containing("### Final Answer Contract");
    assert_eq!(final_prompts.len(), 1);
    assert!(final_prompts[0].contains("Result: x = 1.3247"));

    let plan_prompts = generator.prompts_containing("### Plan Contract");
    assert!(plan_prompts[0].contains("Method: Bisection"));
}

/// When no candidate succeeds the run still completes, using the fallback
/// ranking, and reports itself as degraded.
#[tokio::test]
async fn all_failed_candidates_select_by_fallback_penalty() {
    let generator = ScriptedGenerator::new()
        .respond("### Research Contract", r#"{"candidate_methods": ["Bisection", "Secant"], "reasoning": "bracketed", "research_actions": ""}"#)
        .respond("### Plan Contract", r#"{"steps": []}"#)
        .respond("### Final Answer Contract", "No method converged.");
    let sandbox = ScriptedSandbox::new(vec![
        Execution::success(r#"{"method":"Bisection","success":false,"residual":0.05}"#),
        Execution::success(r#"{"method":"Secant","success":false,"result":0.9}"#),
    ]);
    let agent = ScriptedStepAgent::default();
    let config = config(6);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let outcome = pipeline.run(TASK, |_| {}).await.expect("run");

    assert!(outcome.degraded);
    assert_eq!(outcome.state.validation_results.len(), 2);
    assert_eq!(outcome.state.selected_method(), Some("Bisection"));
    assert!(outcome.state.is_terminal());
}

#[tokio::test]
async fn unreachable_generator_fails_the_run() {
    let generator = ScriptedGenerator::unavailable();
    let sandbox = ScriptedSandbox::new(Vec::new());
    let agent = ScriptedStepAgent::default();
    let config = config(1);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let err = pipeline.run(TASK, |_| {}).await.unwrap_err();

    assert!(is_fatal(&err));
    assert_eq!(sandbox.sessions_opened(), 0);
}

#[tokio::test]
async fn unreachable_sandbox_fails_the_run() {
    let generator = ScriptedGenerator::new();
    let sandbox = ScriptedSandbox::unavailable();
    let agent = ScriptedStepAgent::default();
    let config = config(2);
    let pipeline = Pipeline {
        generator: &generator,
        sandbox: &sandbox,
        step_agent: &agent,
        config: &config,
    };

    let err = pipeline.run(TASK, |_| {}).await.unwrap_err();

    assert!(is_fatal(&err));
    assert!(agent.requests().is_empty());
}
