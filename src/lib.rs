//! # CodeTutor Backend
//!
//! The code execution service behind the CodeTutor tutorials.
//!
//! ## Architecture
//!
//! A request carries source code and a language tag:
//! - **Dispatcher** validates it and picks the language adapter
//! - **Toolchain** adapters write the source into a private workspace and
//!   describe the compile and run commands
//! - **Process runner** executes each command under a wall-clock deadline and
//!   kills the whole process group when it is done
//!
//! Every outcome, including compiler errors, timeouts and missing toolchains,
//! comes back as an [`ExecutionResult`].
//!
//! ## Supported languages
//!
//! Python, C, C++, Java and C#.
//!
//! ## Platforms
//!
//! Unix only. Other targets fail to build rather than run children that
//! could outlive their deadline.

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms
)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

// Containment relies on process groups and `killpg`.
#[cfg(not(unix))]
compile_error!("codetutor requires a Unix host: children are confined with process groups");

pub mod config;
pub mod executor;
pub mod server;

pub use config::ServerArgs;
pub use executor::{
    Dispatcher, ExecutionConfig, ExecutionError, ExecutionResult, FailureKind, Language,
    ToolchainStatus,
};
pub use server::{AppState, TokenVerifier};

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
