//! CodeTutor backend server
//!
//! Serves the code execution API over HTTP.

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codetutor::{
    executor::capabilities::detect_all,
    server::{self, AppState, TokenVerifier},
    Dispatcher, ServerArgs,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = ServerArgs::parse();
    info!(version = codetutor::VERSION, "starting CodeTutor backend");

    let config = args.execution_config();
    if let Some(root) = &config.temp_root {
        std::fs::create_dir_all(root)
            .with_context(|| format!("cannot create temp root {}", root.display()))?;
    }
    let dispatcher = Dispatcher::new(config);

    let toolchains = detect_all(&dispatcher).await;
    let missing: Vec<_> = toolchains
        .iter()
        .filter(|status| !status.available)
        .map(|status| status.language.display_name())
        .collect();
    if !missing.is_empty() {
        warn!(languages = ?missing, "some languages cannot run on this host");
    }

    let state = AppState::new(
        dispatcher,
        TokenVerifier::new(args.jwt_secret.as_bytes()),
        toolchains,
    );
    let app = server::create_app(state, &args.cors_origins)?;

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("cannot bind {}", args.bind))?;
    server::serve(listener, app).await
}
