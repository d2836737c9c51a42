//! Dependency resolution: decide which imported modules need installing.

use std::{collections::HashMap, fs, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A module the snippet imports and the installable package that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallEntry {
    pub module: String,
    pub package: String,
}

impl InstallEntry {
    pub fn new(module: impl Into<String>, package: impl Into<String>) -> Self {
        Self { module: module.into(), package: package.into() }
    }
}

/// Import names whose distribution is published under a different name.
const BUILTIN_PACKAGES: &[(&str, &str)] = &[
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("docx", "python-docx"),
    ("dotenv", "python-dotenv"),
    ("jwt", "PyJWT"),
    ("magic", "python-magic"),
    ("PIL", "Pillow"),
    ("serial", "pyserial"),
    ("skimage", "scikit-image"),
    ("sklearn", "scikit-learn"),
    ("yaml", "PyYAML"),
    ("zmq", "pyzmq"),
];

/// Module name to package name lookup. Unknown modules map to themselves.
#[derive(Debug, Clone, Default)]
pub struct PackageMap {
    inner: HashMap<String, String>,
}

impl PackageMap {
    pub fn builtin() -> Self {
        BUILTIN_PACKAGES
            .iter()
            .map(|(m, p)| ((*m).to_string(), (*p).to_string()))
            .collect()
    }

    /// Merge a `{"module": "package"}` JSON document over the current entries.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let overrides: HashMap<String, String> =
            serde_json::from_str(&text).map_err(|source| Error::Json {
                path: path.to_path_buf(),
                source,
            })?;
        self.inner.extend(overrides);
        Ok(())
    }

    pub fn insert(&mut self, module: impl Into<String>, package: impl Into<String>) {
        self.inner.insert(module.into(), package.into());
    }

    pub fn package_for<'a>(&'a self, module: &'a str) -> &'a str {
        self.inner.get(module).map_or(module, String::as_str)
    }
}

impl FromIterator<(String, String)> for PackageMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { inner: iter.into_iter().collect() }
    }
}

/// Work out what has to be installed before `modules` can be imported.
///
/// Modules for which `is_available` holds are skipped. Every entry of `extra`
/// is added as its own module and package unless a package of that name is
/// already queued. Output keeps first-seen order and holds each package once.
/// Nothing is installed here.
pub fn resolve<F>(
    modules: &[String],
    is_available: F,
    packages: &PackageMap,
    extra: &[String],
) -> Vec<InstallEntry>
where
    F: Fn(&str) -> bool,
{
    let mut queued: IndexMap<String, InstallEntry> = IndexMap::new();
    let mut seen = std::collections::HashSet::new();

    for module in modules {
        if !seen.insert(module.as_str()) || is_available(module) {
            continue;
        }
        let package = packages.package_for(module);
        if !queued.contains_key(package) {
            queued.insert(package.to_string(), InstallEntry::new(module.as_str(), package));
        }
    }

    for package in extra {
        if !queued.contains_key(package) {
            queued.insert(package.clone(), InstallEntry::new(package.as_str(), package.as_str()));
        }
    }

    queued.into_values().collect()
}
