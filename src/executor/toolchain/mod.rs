//! Per-language toolchain adapters.
//!
//! The execution core stays language-agnostic. An adapter only decides what
//! scratch space it needs, which files to write, and which commands compile
//! and run the result; [`run_plan`] applies the same failure policy to all of
//! them.

mod csharp;
mod java;
mod native;
mod python;

pub use csharp::CSharpToolchain;
pub use java::{extract_public_class, JavaToolchain};
pub use native::NativeToolchain;
pub use python::PythonToolchain;

use std::path::PathBuf;

use tracing::{debug, info};

use super::{
    ExecutionConfig, ExecutionError, ExecutionResult, Invocation, Language, Phase, ProcessRunner,
    SpawnError, Workspace, WorkspaceKind,
};

/// Commands an adapter produced for one materialized workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Directory every step runs in
    pub working_dir: PathBuf,
    /// Optional compiler invocation, run with the compile deadline
    pub compile: Option<Invocation>,
    /// Final invocation whose outcome becomes the result
    pub run: Invocation,
    /// Deadline class of the final invocation
    pub run_deadline: Phase,
}

/// Language adapter contract
pub trait Toolchain: Send + Sync {
    /// Language handled by this adapter
    fn language(&self) -> Language;

    /// Scratch space this adapter needs
    fn workspace_kind(&self) -> WorkspaceKind;

    /// Human-readable notice used when a toolchain binary is absent
    fn missing_message(&self) -> &'static str;

    /// Command that prints the toolchain version
    fn version_probe(&self) -> Invocation;

    /// Write `source` into `workspace` and describe how to build and run it
    fn materialize(&self, workspace: &Workspace, source: &str)
        -> Result<BuildPlan, ExecutionError>;
}

/// Default adapter set for the given configuration
#[must_use]
pub fn default_toolchains(config: &ExecutionConfig) -> Vec<Box<dyn Toolchain>> {
    vec![
        Box::new(PythonToolchain::new(config.python_interpreter.clone())),
        Box::new(NativeToolchain::c()),
        Box::new(NativeToolchain::cpp()),
        Box::new(JavaToolchain),
        Box::new(CSharpToolchain::new(config.dotnet_target_framework.clone())),
    ]
}

/// Run a plan: compile (if any), then run, short-circuiting on failure
///
/// # Errors
///
/// Every failure class after materialization: missing toolchain,
/// compilation, runtime, timeout, or an internal spawn fault.
pub async fn run_plan(
    toolchain: &dyn Toolchain,
    plan: &BuildPlan,
    runner: &ProcessRunner,
    config: &ExecutionConfig,
) -> Result<ExecutionResult, ExecutionError> {
    if let Some(compile) = &plan.compile {
        let limit = config.timeout_for(Phase::Compile);
        let outcome = runner
            .run(compile, &plan.working_dir, limit)
            .await
            .map_err(|e| spawn_failure(toolchain, e))?;
        debug!(
            language = %toolchain.language(),
            exit_code = ?outcome.exit_code,
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "compile step finished"
        );

        if outcome.timed_out {
            return Err(ExecutionError::Timeout {
                phase: Phase::Compile,
                limit,
                partial_output: String::new(),
            });
        }
        if !outcome.success() {
            let diagnostics = outcome
                .stderr
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(outcome.stdout);
            return Err(ExecutionError::Compilation(diagnostics));
        }
    }

    let limit = config.timeout_for(plan.run_deadline);
    let outcome = runner
        .run(&plan.run, &plan.working_dir, limit)
        .await
        .map_err(|e| spawn_failure(toolchain, e))?;
    info!(
        language = %toolchain.language(),
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        "run step finished"
    );

    if outcome.timed_out {
        return Err(ExecutionError::Timeout {
            phase: Phase::Run,
            limit,
            partial_output: outcome.stdout,
        });
    }
    if !outcome.success() {
        return Err(ExecutionError::Runtime {
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
        });
    }
    Ok(ExecutionResult::completed(outcome.stdout, outcome.stderr))
}

fn spawn_failure(toolchain: &dyn Toolchain, err: SpawnError) -> ExecutionError {
    match err {
        SpawnError::NotFound { .. } => {
            ExecutionError::ToolchainMissing(toolchain.missing_message().to_string())
        }
        other => ExecutionError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FailureKind;
    use std::time::Duration;

    /// Shell-driven adapter so the pipeline can be tested without compilers
    struct ScriptToolchain {
        compile: Option<&'static str>,
        run: &'static str,
    }

    impl Toolchain for ScriptToolchain {
        fn language(&self) -> Language {
            Language::C
        }

        fn workspace_kind(&self) -> WorkspaceKind {
            WorkspaceKind::Directory
        }

        fn missing_message(&self) -> &'static str {
            "Script toolchain not found."
        }

        fn version_probe(&self) -> Invocation {
            Invocation::new(["sh", "-c", "echo 1.0"])
        }

        fn materialize(
            &self,
            workspace: &Workspace,
            source: &str,
        ) -> Result<BuildPlan, ExecutionError> {
            workspace.write_file("program.sh", source)?;
            Ok(BuildPlan {
                working_dir: workspace.working_dir().to_path_buf(),
                compile: self.compile.map(|script| Invocation::new(["sh", "-c", script])),
                run: Invocation::new(["sh", "-c", self.run]),
                run_deadline: Phase::Run,
            })
        }
    }

    fn config() -> ExecutionConfig {
        ExecutionConfig {
            compile_timeout: Duration::from_millis(500),
            run_timeout: Duration::from_millis(500),
            ..ExecutionConfig::default()
        }
    }

    async fn execute(toolchain: &ScriptToolchain) -> (Result<ExecutionResult, ExecutionError>, u64) {
        let runner = ProcessRunner::new(4096);
        let workspace = Workspace::create(WorkspaceKind::Directory, None).unwrap();
        let plan = toolchain.materialize(&workspace, "echo unused").unwrap();
        let result = run_plan(toolchain, &plan, &runner, &config()).await;
        (result, runner.spawn_count())
    }

    #[tokio::test]
    async fn test_compile_failure_short_circuits() {
        let toolchain = ScriptToolchain {
            compile: Some("echo 'program.c:1:1: error: unknown type' >&2; exit 1"),
            run: "echo should-not-run",
        };
        let (result, spawned) = execute(&toolchain).await;
        let err = result.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Compilation);
        assert_eq!(
            err.to_string(),
            "Compilation error: program.c:1:1: error: unknown type\n"
        );
        assert_eq!(spawned, 1);
    }

    #[tokio::test]
    async fn test_compile_diagnostics_fall_back_to_stdout() {
        let toolchain = ScriptToolchain {
            compile: Some("echo 'build failed'; exit 1"),
            run: "true",
        };
        let (result, _) = execute(&toolchain).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Compilation error: build failed\n"
        );
    }

    #[tokio::test]
    async fn test_compile_timeout_is_reported_as_compile() {
        let toolchain = ScriptToolchain {
            compile: Some("sleep 30"),
            run: "true",
        };
        let (result, spawned) = execute(&toolchain).await;
        let result = ExecutionResult::from(result.unwrap_err());

        assert_eq!(
            result.error.as_deref(),
            Some("Compilation timed out (500 ms limit)")
        );
        assert_eq!(spawned, 1);
    }

    #[tokio::test]
    async fn test_run_failure_keeps_stdout_and_stderr() {
        let toolchain = ScriptToolchain {
            compile: Some("true"),
            run: "echo partial; echo boom >&2; exit 4",
        };
        let (result, spawned) = execute(&toolchain).await;
        let result = ExecutionResult::from(result.unwrap_err());

        assert!(!result.success);
        assert_eq!(result.output, "partial\n");
        assert_eq!(result.error.as_deref(), Some("boom\n"));
        assert_eq!(spawned, 2);
    }

    #[tokio::test]
    async fn test_success() {
        let toolchain = ScriptToolchain {
            compile: None,
            run: "echo hello",
        };
        let (result, _) = execute(&toolchain).await;
        let result = result.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello\n");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_missing_binary_uses_toolchain_message() {
        let runner = ProcessRunner::new(4096);
        let toolchain = ScriptToolchain {
            compile: None,
            run: "true",
        };
        let plan = BuildPlan {
            working_dir: std::env::temp_dir(),
            compile: Some(Invocation::new(["no-such-compiler-on-this-host"])),
            run: Invocation::new(["true"]),
            run_deadline: Phase::Run,
        };
        let err = run_plan(&toolchain, &plan, &runner, &config())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ToolchainMissing);
        assert_eq!(err.to_string(), "Script toolchain not found.");
    }
}
