//! Python interpreter subprocess speaking newline-delimited JSON.
//!
//! The bootstrap module is written to a private directory that is prepended
//! to `PYTHONPATH`, then imported by a one-line `-c` launcher. Replies come
//! back on the interpreter's original stdout; the snippet's own output is
//! redirected to stderr by the bootstrap.

use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::{debug, trace};

use super::{Interpreter, ProcessHandle};
use crate::{
    error::{Error, Result},
    serializer::{from_json_str, from_json_value, PyValue},
};

pub const BOOTSTRAP_MODULE: &str = "pysession_bootstrap";
pub const BOOTSTRAP_VERSION: u32 = 1;
const BOOTSTRAP_SOURCE: &str = include_str!("bootstrap.py");

#[derive(Debug, Clone)]
pub struct PythonOptions {
    pub python: PathBuf,
    pub recursion_limit: u32,
}

impl Default for PythonOptions {
    fn default() -> Self {
        Self { python: PathBuf::from("python3"), recursion_limit: 400 }
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Importable { modules: &'a [String] },
    Restore { path: &'a Path },
    Execute { code: &'a str },
    Dump { path: &'a Path },
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Handshake {
    bootstrap: u32,
    python: String,
}

pub struct PythonProcess {
    handle: ProcessHandle,
    // keeps the bootstrap module on disk for the life of the interpreter
    bootstrap_dir: TempDir,
}

impl PythonProcess {
    pub async fn spawn(options: &PythonOptions) -> Result<Self> {
        let bootstrap_dir = tempfile::Builder::new()
            .prefix("pysession-")
            .tempdir()
            .map_err(|e| Error::io(env::temp_dir(), e))?;
        let module_path = bootstrap_dir.path().join(format!("{BOOTSTRAP_MODULE}.py"));
        fs::write(&module_path, BOOTSTRAP_SOURCE).map_err(|e| Error::io(&module_path, e))?;

        let mut paths = vec![bootstrap_dir.path().to_path_buf()];
        if let Some(existing) = env::var_os("PYTHONPATH") {
            paths.extend(env::split_paths(&existing));
        }
        let python_path = env::join_paths(paths).map_err(|e| Error::Protocol(e.to_string()))?;

        let mut cmd = Command::new(&options.python);
        cmd.arg("-u")
            .arg("-c")
            .arg(format!("import {BOOTSTRAP_MODULE}; {BOOTSTRAP_MODULE}.serve()"))
            .env("PYTHONPATH", python_path)
            .env("PYSESSION_RECURSION_LIMIT", options.recursion_limit.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::io(&options.python, e))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Protocol("no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("no stdout".into()))?;

        let mut process = Self {
            handle: ProcessHandle { child, stdin, stdout: BufReader::new(stdout).lines() },
            bootstrap_dir,
        };

        let hello: Handshake = serde_json::from_value(process.read_reply().await?)
            .map_err(|e| Error::Protocol(format!("bad handshake: {e}")))?;
        if hello.bootstrap != BOOTSTRAP_VERSION {
            return Err(Error::Protocol(format!(
                "bootstrap version {} does not match expected {BOOTSTRAP_VERSION}",
                hello.bootstrap
            )));
        }
        debug!(python = %hello.python, "interpreter ready");
        Ok(process)
    }

    async fn call(&mut self, request: &Request<'_>) -> Result<Value> {
        let mut line = serde_json::to_string(request).map_err(|e| Error::Protocol(e.to_string()))?;
        trace!(request = %line, "-> interpreter");
        line.push('\n');
        if let Err(e) = self.write_line(&line).await {
            debug!(error = %e, "interpreter stdin closed");
            return Err(self.exited().await);
        }
        self.read_reply().await
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.handle.stdin.write_all(line.as_bytes()).await?;
        self.handle.stdin.flush().await
    }

    async fn read_reply(&mut self) -> Result<Value> {
        let line = match self.handle.stdout.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(self.exited().await),
            Err(e) => return Err(Error::Protocol(format!("failed to read reply: {e}"))),
        };
        trace!(reply = %line, "<- interpreter");
        let reply = parse_reply(&line)?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(Error::Raised(reply.error.unwrap_or_else(|| "unknown interpreter error".into())))
        }
    }

    async fn exited(&mut self) -> Error {
        match self.handle.child.wait().await {
            Ok(status) => Error::InterpreterExited(status.to_string()),
            Err(e) => Error::InterpreterExited(e.to_string()),
        }
    }

    /// Close the request stream and wait for the interpreter to finish.
    pub async fn shutdown(self) -> Result<()> {
        // dropping stdin ends the bootstrap's request loop
        let ProcessHandle { mut child, stdin, .. } = self.handle;
        drop(stdin);
        let status = child
            .wait()
            .await
            .map_err(|e| Error::InterpreterExited(e.to_string()))?;
        if let Err(e) = self.bootstrap_dir.close() {
            debug!(error = %e, "failed to remove bootstrap directory");
        }
        debug!(%status, "interpreter stopped");
        Ok(())
    }
}

fn parse_reply(line: &str) -> Result<Reply> {
    from_json_str(line).map_err(|e| Error::Protocol(format!("malformed reply: {e}")))
}

#[async_trait]
impl Interpreter for PythonProcess {
    async fn importable(&mut self, modules: &[String]) -> Result<HashSet<String>> {
        if modules.is_empty() {
            return Ok(HashSet::new());
        }
        let value = self.call(&Request::Importable { modules }).await?;
        from_json_value(value).map_err(|e| Error::Protocol(format!("bad module list: {e}")))
    }

    async fn restore_state(&mut self, snapshot: &Path) -> Result<()> {
        self.call(&Request::Restore { path: snapshot }).await.map(drop)
    }

    async fn execute(&mut self, code: &str) -> Result<PyValue> {
        let value = self.call(&Request::Execute { code }).await?;
        from_json_value(value).map_err(|e| Error::Protocol(format!("bad result value: {e}")))
    }

    async fn dump_state(&mut self, snapshot: &Path) -> Result<()> {
        self.call(&Request::Dump { path: snapshot }).await.map(drop)
    }
}
