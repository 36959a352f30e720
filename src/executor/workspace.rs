//! Per-request scratch space.
//!
//! A [`Workspace`] always owns a private temporary directory. A single-file
//! workspace holds exactly one source file inside it; a directory workspace
//! holds whatever named files the adapter writes. The directory is the
//! working directory of every process, so files a program creates land
//! inside it and are removed with it when the workspace is closed or dropped.
//! A failed compile, a timed-out run, or a panicking adapter never leaves
//! files behind.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

const PREFIX: &str = "codetutor-";

/// Stem of the source file in a single-file workspace
const SOURCE_STEM: &str = "main";

/// Workspace errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Filesystem failure while creating, writing or removing the workspace
    #[error("workspace I/O failed: {0}")]
    Io(#[from] io::Error),

    /// File name that is not a single plain path component
    #[error("invalid workspace file name: {0:?}")]
    InvalidFileName(String),

    /// Operation does not apply to this kind of workspace
    #[error("operation not supported by a {0} workspace")]
    WrongKind(&'static str),
}

/// Shape of the scratch space an adapter needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceKind {
    /// One source file with the given extension (without the dot) in a
    /// private directory
    SingleFile {
        /// File extension, e.g. `py`
        extension: &'static str,
    },
    /// An empty temporary directory for one or more named files
    Directory,
}

enum Scope {
    File { dir: TempDir, source: PathBuf },
    Dir(TempDir),
}

/// An exclusively owned, uniquely named temporary directory
pub struct Workspace {
    scope: Scope,
}

impl Workspace {
    /// Create a workspace under `root`, or under the OS temp dir when `None`
    ///
    /// # Errors
    ///
    /// Returns an error if the file or directory cannot be created.
    pub fn create(kind: WorkspaceKind, root: Option<&Path>) -> Result<Self, WorkspaceError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let scope = match kind {
            WorkspaceKind::SingleFile { extension } => {
                let name = format!("{SOURCE_STEM}.{extension}");
                if !is_plain_file_name(&name) {
                    return Err(WorkspaceError::InvalidFileName(name));
                }
                let source = dir.path().join(name);
                fs::File::create(&source)?;
                Scope::File { dir, source }
            }
            WorkspaceKind::Directory => Scope::Dir(dir),
        };
        Ok(Self { scope })
    }

    /// Which kind of workspace this is
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.scope {
            Scope::File { .. } => "single-file",
            Scope::Dir(_) => "directory",
        }
    }

    /// Path of the source file (single-file) or of the directory (directory)
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.scope {
            Scope::File { source, .. } => source,
            Scope::Dir(dir) => dir.path(),
        }
    }

    /// Private directory processes run in
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        match &self.scope {
            Scope::File { dir, .. } | Scope::Dir(dir) => dir.path(),
        }
    }

    /// Write the source of a single-file workspace
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::WrongKind`] for a directory workspace and
    /// [`WorkspaceError::Io`] if the file cannot be written.
    pub fn write_source(&self, contents: &str) -> Result<PathBuf, WorkspaceError> {
        match &self.scope {
            Scope::File { source, .. } => {
                fs::write(source, contents)?;
                Ok(source.clone())
            }
            Scope::Dir(_) => Err(WorkspaceError::WrongKind(self.kind_name())),
        }
    }

    /// Write a named file into a directory workspace
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::WrongKind`] for a single-file workspace,
    /// [`WorkspaceError::InvalidFileName`] unless `name` is one plain path
    /// component, and [`WorkspaceError::Io`] if the file cannot be written.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, WorkspaceError> {
        let Scope::Dir(dir) = &self.scope else {
            return Err(WorkspaceError::WrongKind(self.kind_name()));
        };
        if !is_plain_file_name(name) {
            return Err(WorkspaceError::InvalidFileName(name.to_string()));
        }
        let path = dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Path a named artifact would have inside a directory workspace
    ///
    /// # Errors
    ///
    /// Same kind and file-name checks as [`Workspace::write_file`].
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let Scope::Dir(dir) = &self.scope else {
            return Err(WorkspaceError::WrongKind(self.kind_name()));
        };
        if !is_plain_file_name(name) {
            return Err(WorkspaceError::InvalidFileName(name.to_string()));
        }
        Ok(dir.path().join(name))
    }

    /// Remove the workspace now and report removal failures.
    ///
    /// Dropping a workspace also removes it, but silently.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] if the directory cannot be removed.
    pub fn close(self) -> Result<(), WorkspaceError> {
        match self.scope {
            Scope::File { dir, .. } | Scope::Dir(dir) => dir.close()?,
        }
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
