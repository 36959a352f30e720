//! Execution dispatcher: the single entry point that always yields a result.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::toolchain::{default_toolchains, run_plan};
use super::{
    ExecutionConfig, ExecutionError, ExecutionResult, Language, ProcessRunner, Toolchain,
    Workspace,
};

const MISSING_INPUT: &str = "Code and language are required";

/// Validates requests, picks the adapter, and normalizes every outcome.
///
/// Stateless apart from the shared runner, so one dispatcher serves all
/// concurrent requests.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<ExecutionConfig>,
    runner: Arc<ProcessRunner>,
    toolchains: HashMap<Language, Arc<dyn Toolchain>>,
}

impl Dispatcher {
    /// Create a dispatcher with the default adapter for every language
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        let toolchains = default_toolchains(&config);
        Self::with_toolchains(config, toolchains)
    }

    /// Create a dispatcher with an explicit adapter set.
    ///
    /// A later adapter for the same language replaces an earlier one.
    #[must_use]
    pub fn with_toolchains(config: ExecutionConfig, toolchains: Vec<Box<dyn Toolchain>>) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.max_output_bytes));
        let toolchains: HashMap<Language, Arc<dyn Toolchain>> = toolchains
            .into_iter()
            .map(|toolchain| (toolchain.language(), Arc::from(toolchain)))
            .collect();
        Self {
            config: Arc::new(config),
            runner,
            toolchains,
        }
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Shared process runner
    #[must_use]
    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Adapter registered for `language`
    #[must_use]
    pub fn toolchain(&self, language: Language) -> Option<&dyn Toolchain> {
        self.toolchains.get(&language).map(Arc::as_ref)
    }

    /// Registered adapters in [`Language::all`] order
    pub fn toolchains(&self) -> impl Iterator<Item = &dyn Toolchain> + '_ {
        Language::all()
            .into_iter()
            .filter_map(|language| self.toolchain(language))
    }

    /// Execute `source` written in the language named by `tag`
    pub async fn execute(&self, source: &str, tag: &str) -> ExecutionResult {
        let span = info_span!(
            "execute",
            execution_id = %Uuid::new_v4(),
            language = %tag.trim(),
        );
        async {
            let result = match self.try_execute(source, tag).await {
                Ok(result) => result,
                Err(err) => ExecutionResult::from(err),
            };
            info!(
                success = result.success,
                failure = ?result.failure,
                "execution finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn try_execute(
        &self,
        source: &str,
        tag: &str,
    ) -> Result<ExecutionResult, ExecutionError> {
        if source.trim().is_empty() || tag.trim().is_empty() {
            return Err(ExecutionError::Validation(MISSING_INPUT.to_string()));
        }
        let language: Language = tag.parse()?;
        let toolchain = self.toolchains.get(&language).cloned().ok_or_else(|| {
            ExecutionError::ToolchainMissing(format!(
                "No toolchain configured for {}",
                language.display_name()
            ))
        })?;

        let runner = Arc::clone(&self.runner);
        let config = Arc::clone(&self.config);
        let source = source.to_string();

        // Own task: a panicking adapter surfaces as a JoinError, and the
        // workspace is still dropped (and removed) during unwinding.
        let task = tokio::spawn(
            run_in_workspace(toolchain, runner, config, source).in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(ExecutionError::Internal(panic_message(join_err))),
        }
    }
}

async fn run_in_workspace(
    toolchain: Arc<dyn Toolchain>,
    runner: Arc<ProcessRunner>,
    config: Arc<ExecutionConfig>,
    source: String,
) -> Result<ExecutionResult, ExecutionError> {
    let workspace = Workspace::create(toolchain.workspace_kind(), config.temp_root.as_deref())?;
    let result = match toolchain.materialize(&workspace, &source) {
        Ok(plan) => run_plan(toolchain.as_ref(), &plan, &runner, &config).await,
        Err(err) => Err(err),
    };
    if let Err(err) = workspace.close() {
        warn!(error = %err, "failed to remove workspace");
    }
    result
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "adapter panicked".to_string())
}
