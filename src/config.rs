//! Server configuration from command-line flags and environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::executor::{ExecutionConfig, DEFAULT_MAX_OUTPUT_BYTES};

/// CodeTutor backend server
#[derive(Parser, Debug, Clone)]
#[command(name = "codetutor-server", version, about)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "CODETUTOR_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Allowed CORS origins
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub cors_origins: Vec<String>,

    /// HS256 secret used to verify bearer tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub jwt_secret: String,

    /// Deadline for compile steps, in seconds
    #[arg(long, env = "CODETUTOR_COMPILE_TIMEOUT", default_value_t = 30)]
    pub compile_timeout_secs: u64,

    /// Deadline for run steps, in seconds
    #[arg(long, env = "CODETUTOR_RUN_TIMEOUT", default_value_t = 10)]
    pub run_timeout_secs: u64,

    /// Bytes of output kept per stream
    #[arg(long, env = "CODETUTOR_MAX_OUTPUT", default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    pub max_output_bytes: usize,

    /// Parent directory for per-request workspaces
    #[arg(long, env = "CODETUTOR_TEMP_ROOT")]
    pub temp_root: Option<PathBuf>,

    /// Python interpreter
    #[arg(long, env = "CODETUTOR_PYTHON", default_value = "python3")]
    pub python: String,

    /// Target framework for generated C# projects
    #[arg(long, env = "CODETUTOR_DOTNET_FRAMEWORK", default_value = "net6.0")]
    pub dotnet_framework: String,
}

impl ServerArgs {
    /// Executor settings derived from the flags
    #[must_use]
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            compile_timeout: Duration::from_secs(self.compile_timeout_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            max_output_bytes: self.max_output_bytes,
            temp_root: self.temp_root.clone(),
            python_interpreter: self.python.clone(),
            dotnet_target_framework: self.dotnet_framework.clone(),
        }
    }
}
