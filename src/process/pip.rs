//! Package installation through `python -m pip`, one package at a time.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::Installer;
use crate::{
    error::{Error, Result},
    resolver::InstallEntry,
};

#[derive(Debug, Clone)]
pub struct PipInstaller {
    python: PathBuf,
}

impl PipInstaller {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self { python: python.into() }
    }
}

#[async_trait]
impl Installer for PipInstaller {
    async fn install(&mut self, entry: &InstallEntry) -> Result<()> {
        info!(module = %entry.module, package = %entry.package, "installing");
        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
            .arg(&entry.package)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::io(&self.python, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(package = %entry.package, output = %stdout.trim(), "pip output");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map_or_else(|| output.status.to_string(), |l| l.trim().to_string());
            return Err(Error::Install { package: entry.package.clone(), message });
        }
        Ok(())
    }
}
