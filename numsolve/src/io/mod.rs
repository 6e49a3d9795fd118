//! Side-effecting adapters: configuration, processes, model and sandbox access.

pub mod config;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod report;
pub mod sandbox;

/// True when `err` means a required capability cannot be reached at all.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<generator::GeneratorUnavailable>().is_some()
        || err.downcast_ref::<sandbox::SandboxUnavailable>().is_some()
}
