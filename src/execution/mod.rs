//! Execution engine: requests, stages and the result envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{imports::ImportSource, session::SessionName};

pub mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorOptions};

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    /// Known imports; when absent the code is scanned.
    pub imports: Option<Vec<String>>,
    /// Run statelessly when `None`.
    pub session: Option<SessionName>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into(), imports: None, session: None }
    }

    pub fn with_session(mut self, session: SessionName) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.imports = Some(imports);
        self
    }

    pub fn import_source(&self) -> ImportSource {
        match &self.imports {
            Some(modules) => ImportSource::Modules(modules.clone()),
            None => ImportSource::Code(self.code.clone()),
        }
    }
}

/// Outcome of one execution; `result` is set on success, `error` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(result: Value) -> Self {
        Self { success: true, result: Some(result), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    SessionResolved,
    DependenciesResolved,
    Preamble,
    Executed,
    Postamble,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SessionResolved => "session-resolved",
            Self::DependenciesResolved => "dependencies-resolved",
            Self::Preamble => "preamble",
            Self::Executed => "executed",
            Self::Postamble => "postamble",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
