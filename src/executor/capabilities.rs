//! Host toolchain detection.
//!
//! Each adapter's version probe is run once through the shared
//! [`ProcessRunner`] so operators can see which languages this host can
//! actually execute before the first request fails.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Dispatcher, Language, ProcessRunner, SpawnError, Toolchain};

/// Deadline for a single version probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Availability of one language toolchain on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainStatus {
    /// Language checked
    pub language: Language,
    /// Whether the probe ran and exited 0
    pub available: bool,
    /// First line the probe printed
    pub version: Option<String>,
    /// What to install when unavailable
    pub setup_instructions: Option<String>,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl ToolchainStatus {
    /// Probe one toolchain
    pub async fn detect(toolchain: &dyn Toolchain, runner: &ProcessRunner) -> Self {
        let language = toolchain.language();
        let probe = toolchain.version_probe();
        let checked_at = Utc::now();
        let outcome = runner.run(&probe, &std::env::temp_dir(), PROBE_TIMEOUT).await;

        let (available, version) = match outcome {
            Ok(outcome) if outcome.success() => {
                // javac from older JDKs prints its version on stderr
                let version = first_line(&outcome.stdout)
                    .or_else(|| outcome.stderr.as_deref().and_then(first_line));
                (true, version)
            }
            Ok(outcome) => {
                warn!(
                    language = %language,
                    exit_code = ?outcome.exit_code,
                    timed_out = outcome.timed_out,
                    "version probe failed"
                );
                (false, None)
            }
            Err(SpawnError::NotFound { program }) => {
                warn!(language = %language, program = %program, "toolchain not installed");
                (false, None)
            }
            Err(e) => {
                warn!(language = %language, error = %e, "version probe could not run");
                (false, None)
            }
        };

        Self {
            language,
            available,
            version,
            setup_instructions: (!available).then(|| setup_instructions(language).to_string()),
            checked_at,
        }
    }
}

/// Probe every toolchain registered with `dispatcher`, in language order
pub async fn detect_all(dispatcher: &Dispatcher) -> Vec<ToolchainStatus> {
    let mut statuses = Vec::new();
    for toolchain in dispatcher.toolchains() {
        let status = ToolchainStatus::detect(toolchain, dispatcher.runner()).await;
        if status.available {
            info!(
                language = %status.language,
                version = status.version.as_deref().unwrap_or("unknown"),
                "toolchain available"
            );
        }
        statuses.push(status);
    }
    statuses
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

fn setup_instructions(language: Language) -> &'static str {
    match language {
        Language::Python => {
            "Install Python 3:\n  Ubuntu/Debian: sudo apt install python3\n  macOS: brew install python3"
        }
        Language::C => {
            "Install GCC:\n  Ubuntu/Debian: sudo apt install gcc\n  macOS: xcode-select --install"
        }
        Language::Cpp => {
            "Install G++:\n  Ubuntu/Debian: sudo apt install g++\n  macOS: xcode-select --install"
        }
        Language::Java => {
            "Install a JDK:\n  Ubuntu/Debian: sudo apt install default-jdk\n  macOS: brew install openjdk"
        }
        Language::CSharp => "Install the .NET SDK:\n  https://dotnet.microsoft.com/download",
    }
}
