//! C# adapter: a generated SDK-style project built and run by `dotnet run`.

use super::{BuildPlan, Toolchain};
use crate::executor::{ExecutionError, Invocation, Language, Phase, Workspace, WorkspaceKind};

const SOURCE_FILE: &str = "program.cs";
const PROJECT_FILE: &str = "program.csproj";

/// .NET toolchain
#[derive(Debug, Clone)]
pub struct CSharpToolchain {
    target_framework: String,
}

impl CSharpToolchain {
    /// Create an adapter generating projects for `target_framework`, e.g. `net6.0`
    #[must_use]
    pub fn new(target_framework: impl Into<String>) -> Self {
        Self {
            target_framework: target_framework.into(),
        }
    }

    /// Minimal executable project descriptor
    #[must_use]
    pub fn project_file(&self) -> String {
        format!(
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>{}</TargetFramework>
  </PropertyGroup>
</Project>
"#,
            self.target_framework
        )
    }
}

impl Default for CSharpToolchain {
    fn default() -> Self {
        Self::new("net6.0")
    }
}

impl Toolchain for CSharpToolchain {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn workspace_kind(&self) -> WorkspaceKind {
        WorkspaceKind::Directory
    }

    fn missing_message(&self) -> &'static str {
        ".NET SDK not found. Please install .NET SDK to run C# code."
    }

    fn version_probe(&self) -> Invocation {
        Invocation::new(["dotnet", "--version"])
    }

    fn materialize(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> Result<BuildPlan, ExecutionError> {
        workspace.write_file(SOURCE_FILE, source)?;
        workspace.write_file(PROJECT_FILE, &self.project_file())?;

        // Build and run happen in one step, so it gets the longer deadline.
        Ok(BuildPlan {
            working_dir: workspace.working_dir().to_path_buf(),
            compile: None,
            run: Invocation::new(["dotnet", "run"])
                .with_env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
                .with_env("DOTNET_NOLOGO", "1")
                .with_env("DOTNET_SKIP_FIRST_TIME_EXPERIENCE", "1"),
            run_deadline: Phase::Compile,
        })
    }
}
