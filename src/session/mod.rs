//! Session persistence: interpreter snapshot, metadata record and last result.
//!
//! Each session `<name>` owns three files in the session directory:
//! `<name>.pkl` (opaque snapshot bytes), `<name>.json` (metadata) and
//! `<name>_result.json` (serialized result of the latest run). Every write
//! replaces the whole file through a temp file in the same directory.
//! There is no locking: concurrent runs against one name may lose updates.

use std::{
    collections::BTreeSet,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    serializer::from_json_str,
};

const RESULT_SUFFIX: &str = "_result";

/// A validated session name: ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionName(String);

impl SessionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidSessionName(s.to_string()))
        }
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Every package ever installed for this session. Only grows.
    pub packages: BTreeSet<String>,
}

impl SessionMetadata {
    fn fresh() -> Self {
        let now = Utc::now();
        Self { created: now, last_modified: now, packages: BTreeSet::new() }
    }
}

#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub snapshot: Option<Vec<u8>>,
    pub metadata: SessionMetadata,
    /// Both the snapshot and the metadata were present and readable.
    pub existed: bool,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Like [`SessionStore::new`], creating the directory (and parents) if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, name: &SessionName) -> PathBuf {
        self.dir.join(format!("{name}.pkl"))
    }

    pub fn metadata_path(&self, name: &SessionName) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn result_path(&self, name: &SessionName) -> PathBuf {
        self.dir.join(format!("{name}{RESULT_SUFFIX}.json"))
    }

    /// Refuse a name whose files overlap another live session's.
    ///
    /// `a_result.json` is both the result of `a` and the metadata of
    /// `a_result`, so those two sessions cannot coexist.
    pub fn check_available(&self, name: &SessionName) -> Result<()> {
        let owner = name
            .as_str()
            .strip_suffix(RESULT_SUFFIX)
            .and_then(|stem| stem.parse::<SessionName>().ok());
        let shadow = format!("{name}{RESULT_SUFFIX}").parse::<SessionName>().ok();
        for other in owner.into_iter().chain(shadow) {
            if self.read_metadata(&other).is_ok() {
                return Err(Error::SessionConflict {
                    name: name.to_string(),
                    other: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Load a session, creating its metadata record when there is no usable one.
    ///
    /// A readable metadata record without a snapshot (a session that never
    /// completed a run) is kept as is, so reopening it leaves `created` alone.
    pub fn open(&self, name: &SessionName) -> Result<OpenedSession> {
        self.check_available(name)?;
        let metadata = match self.read_metadata(name) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                debug!(session = %name, %err, "no usable session metadata");
                None
            }
        };
        let snapshot = fs::read(self.snapshot_path(name)).ok();

        match (metadata, snapshot) {
            (Some(metadata), Some(snapshot)) => {
                debug!(session = %name, bytes = snapshot.len(), "loaded existing session");
                Ok(OpenedSession { snapshot: Some(snapshot), metadata, existed: true })
            }
            (Some(metadata), None) => {
                Ok(OpenedSession { snapshot: None, metadata, existed: false })
            }
            (None, _) => {
                let metadata = SessionMetadata::fresh();
                self.write_metadata(name, &metadata)?;
                info!(session = %name, "created session");
                Ok(OpenedSession { snapshot: None, metadata, existed: false })
            }
        }
    }

    /// Record an execution attempt by bumping `lastModified`.
    pub fn touch(&self, name: &SessionName) -> Result<SessionMetadata> {
        let mut metadata = self.read_metadata(name)?;
        metadata.last_modified = Utc::now();
        self.write_metadata(name, &metadata)?;
        Ok(metadata)
    }

    /// Persist the outcome of a successful run: merged package set, then snapshot.
    pub fn commit<I>(
        &self,
        name: &SessionName,
        snapshot: &[u8],
        installed: I,
    ) -> Result<SessionMetadata>
    where
        I: IntoIterator<Item = String>,
    {
        let mut metadata = self.read_metadata(name)?;
        metadata.packages.extend(installed);
        metadata.last_modified = Utc::now();
        self.write_metadata(name, &metadata)?;
        write_atomic(&self.snapshot_path(name), snapshot)?;
        info!(session = %name, packages = metadata.packages.len(), "committed session");
        Ok(metadata)
    }

    pub fn read_metadata(&self, name: &SessionName) -> Result<SessionMetadata> {
        let path = self.metadata_path(name);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::SessionNotFound(name.to_string()),
            _ => Error::io(&path, e),
        })?;
        serde_json::from_str(&text).map_err(|source| Error::Json { path, source })
    }

    fn write_metadata(&self, name: &SessionName, metadata: &SessionMetadata) -> Result<()> {
        let path = self.metadata_path(name);
        let mut text = serde_json::to_string_pretty(metadata)
            .map_err(|source| Error::Json { path: path.clone(), source })?;
        text.push('\n');
        write_atomic(&path, text.as_bytes())
    }

    pub fn write_result(&self, name: &SessionName, result: &Value) -> Result<()> {
        let path = self.result_path(name);
        let text = serde_json::to_string(result)
            .map_err(|source| Error::Json { path: path.clone(), source })?;
        write_atomic(&path, text.as_bytes())
    }

    /// Move a result staged elsewhere into place as the session's last result.
    pub fn promote_result(&self, name: &SessionName, staged: &Path) -> Result<()> {
        let bytes = fs::read(staged).map_err(|e| Error::io(staged, e))?;
        write_atomic(&self.result_path(name), &bytes)?;
        debug!(session = %name, bytes = bytes.len(), "saved result");
        Ok(())
    }

    pub fn read_result(&self, name: &SessionName) -> Result<Option<Value>> {
        let path = self.result_path(name);
        match fs::read_to_string(&path) {
            Ok(text) => from_json_str(&text)
                .map(Some)
                .map_err(|source| Error::Json { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Sessions with readable metadata, least recently modified first.
    /// Result files are told apart from metadata by their content, not their name.
    pub fn list(&self) -> Result<Vec<(SessionName, SessionMetadata)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };
        let mut sessions = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(name) = stem.parse::<SessionName>() else {
                continue;
            };
            if let Ok(metadata) = self.read_metadata(&name) {
                sessions.push((name, metadata));
            }
        }
        sessions.sort_by(|a, b| {
            a.1.last_modified.cmp(&b.1.last_modified).then_with(|| a.0.cmp(&b.0))
        });
        Ok(sessions)
    }

    /// Delete every artifact of a session. Returns whether anything was removed.
    pub fn remove(&self, name: &SessionName) -> Result<bool> {
        let mut removed = false;
        for path in [self.snapshot_path(name), self.metadata_path(name), self.result_path(name)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(path, e)),
            }
        }
        Ok(removed)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
