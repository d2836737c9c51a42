//! Drives one execution: session load, dependency install, run, persist.

use std::{fs, iter};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{ExecutionRequest, ExecutionResult, Stage};
use crate::{
    process::{Installer, Interpreter},
    resolver::{resolve, PackageMap},
    serializer::ResultSerializer,
    session::{SessionName, SessionStore},
};

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Package that provides snapshot support inside the interpreter.
    pub snapshot_package: String,
    pub packages: PackageMap,
    pub serializer: ResultSerializer,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            snapshot_package: "dill".into(),
            packages: PackageMap::builtin(),
            serializer: ResultSerializer::default(),
        }
    }
}

pub struct Orchestrator<I, P> {
    interpreter: I,
    installer: P,
    store: SessionStore,
    options: OrchestratorOptions,
    stage: Stage,
}

impl<I: Interpreter, P: Installer> Orchestrator<I, P> {
    pub fn new(
        interpreter: I,
        installer: P,
        store: SessionStore,
        options: OrchestratorOptions,
    ) -> Self {
        Self { interpreter, installer, store, options, stage: Stage::Init }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn into_parts(self) -> (I, P) {
        (self.interpreter, self.installer)
    }

    /// Run a request to completion. Failures come back as an unsuccessful envelope.
    pub async fn run(&mut self, request: &ExecutionRequest) -> ExecutionResult {
        self.stage = Stage::Init;
        match self.try_run(request).await {
            Ok(result) => ExecutionResult::ok(result),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(stage = %self.stage, error = %message, "execution failed");
                self.stage = Stage::Failed;
                ExecutionResult::failed(message)
            }
        }
    }

    fn enter(&mut self, stage: Stage, session: Option<&SessionName>) {
        let session = session.map(SessionName::as_str);
        debug!(from = %self.stage, to = %stage, session, "stage");
        self.stage = stage;
    }

    async fn try_run(&mut self, request: &ExecutionRequest) -> Result<Value> {
        let session = request.session.as_ref();

        let opened = match session {
            Some(name) => Some(
                self.store
                    .open(name)
                    .with_context(|| format!("failed to open session {name}"))?,
            ),
            None => None,
        };
        self.enter(Stage::SessionResolved, session);

        let modules = request.import_source().modules();
        let available = self
            .interpreter
            .importable(&modules)
            .await
            .context("failed to check installed modules")?;
        let extra: Vec<String> = match &opened {
            Some(opened) => opened
                .metadata
                .packages
                .iter()
                .cloned()
                .chain(iter::once(self.options.snapshot_package.clone()))
                .collect(),
            None => Vec::new(),
        };
        let entries = resolve(&modules, |m| available.contains(m), &self.options.packages, &extra);
        info!(imports = modules.len(), install = entries.len(), "resolved dependencies");
        for entry in &entries {
            self.installer.install(entry).await?;
        }
        if let Some(name) = session {
            self.store
                .touch(name)
                .with_context(|| format!("failed to update session {name}"))?;
        }
        self.enter(Stage::DependenciesResolved, session);

        // staging area for snapshot files, removed when the run ends
        let workspace = match session {
            Some(_) => Some(
                tempfile::Builder::new()
                    .prefix("pysession-work-")
                    .tempdir()
                    .context("failed to create working directory")?,
            ),
            None => None,
        };

        if let (Some(name), Some(opened), Some(workspace)) = (session, &opened, &workspace) {
            if let (true, Some(snapshot)) = (opened.existed, &opened.snapshot) {
                self.enter(Stage::Preamble, session);
                let path = snapshot_path(workspace, name);
                fs::write(&path, snapshot)
                    .with_context(|| format!("failed to stage snapshot at {}", path.display()))?;
                self.interpreter
                    .restore_state(&path)
                    .await
                    .with_context(|| format!("failed to restore session {name}"))?;
            }
        }

        let value = self.interpreter.execute(&request.code).await?;
        self.enter(Stage::Executed, session);
        let result = self.options.serializer.serialize(&value);

        if let (Some(name), Some(workspace)) = (session, &workspace) {
            self.enter(Stage::Postamble, session);
            let path = snapshot_path(workspace, name);
            self.interpreter
                .dump_state(&path)
                .await
                .context("failed to snapshot interpreter state")?;
            let snapshot = fs::read(&path)
                .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
            let staged = workspace.path().join(format!("{name}_result.json"));
            let text = serde_json::to_vec(&result).context("failed to encode result")?;
            fs::write(&staged, text)
                .with_context(|| format!("failed to stage result at {}", staged.display()))?;

            // the result only lands once snapshot and metadata have
            self.store
                .commit(name, &snapshot, entries.iter().map(|e| e.package.clone()))
                .with_context(|| format!("failed to save session {name}"))?;
            self.store
                .promote_result(name, &staged)
                .with_context(|| format!("failed to save result for session {name}"))?;
        }
        self.enter(Stage::Done, session);
        Ok(result)
    }
}

fn snapshot_path(workspace: &TempDir, name: &SessionName) -> std::path::PathBuf {
    workspace.path().join(format!("{name}.pkl"))
}
