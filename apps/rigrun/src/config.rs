//! Defaults and run-context assembly.

use std::path::PathBuf;

use rigrun_artifact::DEFAULT_EXCLUDES;
use rigrun_pipeline::{RunContext, standard_artifacts};

use crate::cli::Args;

/// Working directory used when none is given.
fn default_workdir() -> PathBuf {
    std::env::temp_dir().join("run")
}

/// Builds the run context from parsed arguments, filling in defaults.
pub fn run_context(args: &Args) -> RunContext {
    let workdir = args.workdir.clone().unwrap_or_else(default_workdir);
    let excludes = if args.excludes.is_empty() {
        DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
    } else {
        args.excludes.clone()
    };

    RunContext {
        host: args.url.clone(),
        workdir,
        excludes,
        artifacts: standard_artifacts(&args.suite, &args.config, &args.image),
    }
}
