//! Python adapter: the interpreter runs the source file directly.

use super::{BuildPlan, Toolchain};
use crate::executor::{ExecutionError, Invocation, Language, Phase, Workspace, WorkspaceKind};

/// Python toolchain
#[derive(Debug, Clone)]
pub struct PythonToolchain {
    interpreter: String,
}

impl PythonToolchain {
    /// Create an adapter using the given interpreter binary
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for PythonToolchain {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Toolchain for PythonToolchain {
    fn language(&self) -> Language {
        Language::Python
    }

    fn workspace_kind(&self) -> WorkspaceKind {
        WorkspaceKind::SingleFile { extension: "py" }
    }

    fn missing_message(&self) -> &'static str {
        "Python interpreter not found. Please install Python to run Python code."
    }

    fn version_probe(&self) -> Invocation {
        Invocation::new([self.interpreter.as_str(), "--version"])
    }

    fn materialize(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> Result<BuildPlan, ExecutionError> {
        let script = workspace.write_source(source)?;
        Ok(BuildPlan {
            working_dir: workspace.working_dir().to_path_buf(),
            compile: None,
            run: Invocation::new([
                self.interpreter.clone(),
                script.to_string_lossy().into_owned(),
            ]),
            run_deadline: Phase::Run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_runs_interpreter_on_source_file() {
        let toolchain = PythonToolchain::default();
        let ws = Workspace::create(toolchain.workspace_kind(), None).unwrap();
        let plan = toolchain.materialize(&ws, "print('hi')").unwrap();

        assert!(plan.compile.is_none());
        assert_eq!(plan.run_deadline, Phase::Run);
        assert_eq!(plan.run.program(), Some("python3"));
        assert_eq!(plan.run.argv[1], ws.path().to_string_lossy());
        assert_eq!(std::fs::read_to_string(ws.path()).unwrap(), "print('hi')");
        assert_eq!(plan.working_dir, ws.working_dir());
        assert_ne!(plan.working_dir, std::env::temp_dir());
    }

    #[test]
    fn test_custom_interpreter() {
        let toolchain = PythonToolchain::new("/opt/python/bin/python3.12");
        assert_eq!(
            toolchain.version_probe().argv,
            vec!["/opt/python/bin/python3.12", "--version"]
        );
    }
}
