//! C and C++ adapters: compile with gcc / g++, then run the executable.

use super::{BuildPlan, Toolchain};
use crate::executor::{ExecutionError, Invocation, Language, Phase, Workspace, WorkspaceKind};

const EXECUTABLE: &str = "program";

/// Native compile-then-run toolchain
#[derive(Debug, Clone)]
pub struct NativeToolchain {
    language: Language,
    compiler: &'static str,
    source_name: &'static str,
    missing_message: &'static str,
}

impl NativeToolchain {
    /// C via gcc
    #[must_use]
    pub const fn c() -> Self {
        Self {
            language: Language::C,
            compiler: "gcc",
            source_name: "program.c",
            missing_message: "GCC compiler not found. Please install GCC to run C code.",
        }
    }

    /// C++ via g++
    #[must_use]
    pub const fn cpp() -> Self {
        Self {
            language: Language::Cpp,
            compiler: "g++",
            source_name: "program.cpp",
            missing_message: "G++ compiler not found. Please install G++ to run C++ code.",
        }
    }

    /// Compiler binary
    #[must_use]
    pub const fn compiler(&self) -> &'static str {
        self.compiler
    }
}

impl Toolchain for NativeToolchain {
    fn language(&self) -> Language {
        self.language
    }

    fn workspace_kind(&self) -> WorkspaceKind {
        WorkspaceKind::Directory
    }

    fn missing_message(&self) -> &'static str {
        self.missing_message
    }

    fn version_probe(&self) -> Invocation {
        Invocation::new([self.compiler, "--version"])
    }

    fn materialize(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> Result<BuildPlan, ExecutionError> {
        let source_path = workspace.write_file(self.source_name, source)?;
        let executable = workspace.artifact_path(EXECUTABLE)?;
        let executable = executable.to_string_lossy().into_owned();

        Ok(BuildPlan {
            working_dir: workspace.working_dir().to_path_buf(),
            compile: Some(Invocation::new([
                self.compiler.to_string(),
                source_path.to_string_lossy().into_owned(),
                "-o".to_string(),
                executable.clone(),
            ])),
            run: Invocation::new([executable]),
            run_deadline: Phase::Run,
        })
    }
}
