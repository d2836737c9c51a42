//! In-memory stand-ins for the Python interpreter and package installer.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use pysession::{
    error::{Error, Result},
    process::{Installer, Interpreter},
    resolver::InstallEntry,
    serializer::PyValue,
};

/// Understands a tiny language: `name = operand (+ operand)*`, bare
/// expressions of the same form, `import ...` (ignored) and `raise <msg>`.
/// Operands are integers or previously assigned names.
#[derive(Debug, Default)]
pub struct FakeInterpreter {
    pub globals: BTreeMap<String, i64>,
    pub installed: HashSet<String>,
    pub fail_dump: bool,
    /// Deleted while dumping, to break whatever runs next.
    pub remove_on_dump: Option<PathBuf>,
    pub calls: Vec<String>,
}

impl FakeInterpreter {
    pub fn with_installed(modules: &[&str]) -> Self {
        Self { installed: modules.iter().map(|m| m.to_string()).collect(), ..Self::default() }
    }

    fn eval(&self, expr: &str) -> Result<i64> {
        expr.split('+').map(str::trim).try_fold(0i64, |acc, operand| -> Result<i64> {
            let value = match operand.parse::<i64>() {
                Ok(n) => n,
                Err(_) => *self
                    .globals
                    .get(operand)
                    .ok_or_else(|| {
                        Error::Raised(format!("NameError: name '{operand}' is not defined"))
                    })?,
            };
            Ok(acc + value)
        })
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn importable(&mut self, modules: &[String]) -> Result<HashSet<String>> {
        self.calls.push("importable".into());
        Ok(modules.iter().filter(|m| self.installed.contains(*m)).cloned().collect())
    }

    async fn restore_state(&mut self, snapshot: &Path) -> Result<()> {
        self.calls.push("restore".into());
        let text = fs::read_to_string(snapshot).map_err(|e| Error::Raised(e.to_string()))?;
        self.globals = serde_json::from_str(&text).map_err(|e| Error::Raised(e.to_string()))?;
        Ok(())
    }

    async fn execute(&mut self, code: &str) -> Result<PyValue> {
        self.calls.push("execute".into());
        let mut last = PyValue::None;
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.starts_with("import ") || line.starts_with("from ") {
                last = PyValue::None;
            } else if let Some(message) = line.strip_prefix("raise ") {
                return Err(Error::Raised(message.to_string()));
            } else if let Some((name, expr)) = line.split_once('=') {
                let value = self.eval(expr)?;
                self.globals.insert(name.trim().to_string(), value);
                last = PyValue::Int(value);
            } else {
                last = PyValue::Int(self.eval(line)?);
            }
        }
        Ok(last)
    }

    async fn dump_state(&mut self, snapshot: &Path) -> Result<()> {
        self.calls.push("dump".into());
        if self.fail_dump {
            return Err(Error::Raised("PicklingError: cannot pickle 'generator' object".into()));
        }
        if let Some(path) = &self.remove_on_dump {
            fs::remove_file(path).map_err(|e| Error::Raised(e.to_string()))?;
        }
        let text = serde_json::to_string(&self.globals).map_err(|e| Error::Raised(e.to_string()))?;
        fs::write(snapshot, text).map_err(|e| Error::Raised(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingInstaller {
    pub installed: Vec<InstallEntry>,
    pub broken: Option<String>,
}

impl RecordingInstaller {
    pub fn failing_on(package: &str) -> Self {
        Self { broken: Some(package.to_string()), ..Self::default() }
    }

    pub fn packages(&self) -> Vec<&str> {
        self.installed.iter().map(|e| e.package.as_str()).collect()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(&mut self, entry: &InstallEntry) -> Result<()> {
        if self.broken.as_deref() == Some(entry.package.as_str()) {
            return Err(Error::Install {
                package: entry.package.clone(),
                message: "No matching distribution found".into(),
            });
        }
        self.installed.push(entry.clone());
        Ok(())
    }
}
