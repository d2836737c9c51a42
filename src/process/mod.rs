//! Interpreter and installer collaborators.
//!
//! The orchestrator only talks to these traits. [`python::PythonProcess`] and
//! [`pip::PipInstaller`] are the subprocess-backed implementations used by the
//! binary; tests drive the orchestrator with in-memory fakes.

use std::{collections::HashSet, path::Path};

use async_trait::async_trait;
use tokio::{
    io::{BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout},
};
use tracing::info;

use crate::{error::Result, resolver::InstallEntry, serializer::PyValue};

pub mod pip;
pub mod python;

/// A live interpreter whose state survives between calls.
#[async_trait]
pub trait Interpreter: Send {
    /// The subset of `modules` that can already be imported.
    async fn importable(&mut self, modules: &[String]) -> Result<HashSet<String>>;

    /// Replace the interpreter's global state with a snapshot file.
    async fn restore_state(&mut self, snapshot: &Path) -> Result<()>;

    /// Run a snippet and report the value it produced.
    async fn execute(&mut self, code: &str) -> Result<PyValue>;

    /// Write the interpreter's global state to a snapshot file.
    async fn dump_state(&mut self, snapshot: &Path) -> Result<()>;
}

#[async_trait]
pub trait Installer: Send {
    async fn install(&mut self, entry: &InstallEntry) -> Result<()>;
}

/// Installer that only reports what it would install.
#[derive(Debug, Default)]
pub struct SkipInstaller;

#[async_trait]
impl Installer for SkipInstaller {
    async fn install(&mut self, entry: &InstallEntry) -> Result<()> {
        info!(module = %entry.module, package = %entry.package, "installation disabled, skipping");
        Ok(())
    }
}

pub struct ProcessHandle {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl<T: Installer + ?Sized> Installer for Box<T> {
    async fn install(&mut self, entry: &InstallEntry) -> Result<()> {
        (**self).install(entry).await
    }
}
