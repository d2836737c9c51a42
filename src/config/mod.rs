use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use directories::BaseDirs;

pub const SESSIONS_DIR: &str = "PYSESSION_SESSIONS_DIR";
pub const PYTHON: &str = "PYSESSION_PYTHON";
pub const SNAPSHOT_PACKAGE: &str = "PYSESSION_SNAPSHOT_PACKAGE";
pub const RECURSION_LIMIT: &str = "PYSESSION_RECURSION_LIMIT";
pub const REPR_LIMIT: &str = "PYSESSION_REPR_LIMIT";
pub const PACKAGE_MAP: &str = "PYSESSION_PACKAGE_MAP";
pub const INSTALL: &str = "PYSESSION_INSTALL";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Defaults, then `KEY=VALUE` lines from `path`, then the environment.
    pub fn load_from(path: &Path) -> Self {
        let mut map = default_map();

        if let Ok(file) = fs::File::open(path) {
            let reader = BufReader::new(file);
            for line in reader.lines().map_while(Result::ok) {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((k, v)) = line.split_once('=') {
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }

        for (k, v) in env::vars() {
            if k.starts_with("PYSESSION_") {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path: path.to_path_buf() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.get_path(SESSIONS_DIR).unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn python(&self) -> PathBuf {
        self.get_path(PYTHON).unwrap_or_else(|| PathBuf::from("python3"))
    }

    pub fn snapshot_package(&self) -> String {
        self.get(SNAPSHOT_PACKAGE)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "dill".into())
    }

    pub fn recursion_limit(&self) -> u32 {
        self.get(RECURSION_LIMIT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(400)
    }

    pub fn repr_limit(&self) -> usize {
        self.get_usize(REPR_LIMIT).unwrap_or(crate::serializer::DEFAULT_REPR_LIMIT)
    }

    pub fn package_map(&self) -> Option<PathBuf> {
        self.get_path(PACKAGE_MAP)
    }

    pub fn install_enabled(&self) -> bool {
        self.get_bool(INSTALL)
    }
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("pysession").join(".pysessionrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert(SESSIONS_DIR.into(), ".".into());
    m.insert(PYTHON.into(), "python3".into());
    m.insert(SNAPSHOT_PACKAGE.into(), "dill".into());
    m.insert(RECURSION_LIMIT.into(), "400".into());
    m.insert(REPR_LIMIT.into(), crate::serializer::DEFAULT_REPR_LIMIT.to_string());
    m.insert(INSTALL.into(), "true".into());
    m
}
