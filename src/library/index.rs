//! Persistent id → folder mapping for one category.
//!
//! The backing store is a flat JSON object (`{"tt0903747": "Breaking Bad"}`) that external
//! tools may rewrite at any time. The in-memory map is replaced wholesale on every load, so
//! a reader holds either the old map or the new one, never a half-populated one.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Deserialize;

use crate::library::Category;

type Entries = HashMap<String, String>;

/// Result of a single in-memory probe. Reload and fallback policy live with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(String),
    Miss,
}

impl Lookup {
    pub fn into_option(self) -> Option<String> {
        match self {
            Lookup::Hit(folder) => Some(folder),
            Lookup::Miss => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("backing store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("backing store is not a valid id map: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("folder does not exist: {0}")]
    MissingFolder(PathBuf),
    #[error("folder name must be a single directory under the media root: `{0}`")]
    InvalidFolder(String),
}

/// Values may be bare folder names or `{ "name": ... }` records written by older import scripts.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFolder {
    Name(String),
    Record { name: String },
}

impl From<StoredFolder> for String {
    fn from(value: StoredFolder) -> Self {
        match value {
            StoredFolder::Name(name) | StoredFolder::Record { name } => name,
        }
    }
}

#[derive(Debug)]
pub struct ContentIndex {
    category: Category,
    path: PathBuf,
    entries: RwLock<Arc<Entries>>,
    /// Serialises read-modify-write cycles on the backing file.
    writer: Mutex<()>,
}

impl ContentIndex {
    /// Create an empty index bound to `path`. Nothing is read until [`ContentIndex::load`].
    pub fn new(category: Category, path: impl Into<PathBuf>) -> Self {
        Self {
            category,
            path: path.into(),
            entries: RwLock::new(Arc::new(Entries::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the backing store and swap it in. A missing or unreadable file yields an
    /// empty index. Returns the number of entries now visible.
    pub fn load(&self) -> usize {
        let entries = match read_store(&self.path) {
            Ok(Some(entries)) => {
                tracing::info!(
                    "{} index '{}' loaded: {} entries",
                    self.category,
                    self.path.display(),
                    entries.len()
                );
                entries
            }
            Ok(None) => {
                tracing::warn!(
                    "{} index '{}' does not exist, starting empty",
                    self.category,
                    self.path.display()
                );
                Entries::new()
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load {} index '{}': {}",
                    self.category,
                    self.path.display(),
                    e
                );
                Entries::new()
            }
        };
        let count = entries.len();
        self.replace(entries);
        count
    }

    pub fn lookup(&self, id: &str) -> Lookup {
        match self.snapshot().get(id) {
            Some(folder) => Lookup::Hit(folder.clone()),
            None => Lookup::Miss,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `id → folder` and persist the whole mapping. Returns `Ok(false)` without touching
    /// the file when `id` is already known, either in memory or on disk.
    pub fn insert(&self, id: &str, folder: &str) -> Result<bool, IndexError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        // Start from what is on disk now so entries added by other writers survive.
        let mut entries = read_store(&self.path)?.unwrap_or_default();
        if let Some(existing) = entries
            .get(id)
            .cloned()
            .or_else(|| self.lookup(id).into_option())
        {
            tracing::info!(
                "{} index already maps {} -> '{}', not adding '{}'",
                self.category,
                id,
                existing,
                folder
            );
            return Ok(false);
        }

        entries.insert(id.to_string(), folder.to_string());
        write_store(&self.path, &entries)?;
        tracing::info!(
            "Added {} -> '{}' to {} index '{}'",
            id,
            folder,
            self.category,
            self.path.display()
        );
        self.replace(entries);
        Ok(true)
    }

    fn snapshot(&self) -> Arc<Entries> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn replace(&self, entries: Entries) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(entries);
    }
}

/// `Ok(None)` when the file does not exist.
fn read_store(path: &Path) -> Result<Option<Entries>, IndexError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Some(Entries::new()));
    }
    let raw: HashMap<String, StoredFolder> = serde_json::from_str(&content)?;
    Ok(Some(
        raw.into_iter()
            .map(|(id, folder)| (id, folder.into()))
            .collect(),
    ))
}

/// Write sorted, pretty JSON through a temp file in the same directory, then rename over
/// the target so concurrent readers never see a truncated document.
fn write_store(path: &Path, entries: &Entries) -> Result<(), IndexError> {
    let sorted: BTreeMap<&str, &str> = entries
        .iter()
        .map(|(id, folder)| (id.as_str(), folder.as_str()))
        .collect();
    let mut json = serde_json::to_string_pretty(&sorted)?;
    json.push('\n');

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
    Ok(())
}
