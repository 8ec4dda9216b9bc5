use std::fmt::{self, Debug};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::backend::{Backend, RoamingType, ScopeHandle, StorageListener};
use crate::storage::error::StorageSystemError;
use crate::storage::file::write_atomic;
use crate::storage::session::{ExternalizationSession, SaveSession, StorageSpec};
use crate::storage::state::{StateData, StateDocument, StateFormat};

/// Strategy mapping sub-elements of component state to individual files
/// inside a directory-based backend.
///
/// `split` returns logical file stems; the backend appends its format's
/// extension on write and strips it again on read.
pub trait StateSplitter: Send + Sync + Debug {
    /// File stems (relative to the storage root) each part of `state`
    /// should land in.
    fn split(&self, component_name: &str, state: &StateData) -> Vec<(String, StateData)>;

    /// Reassemble per-component states from the (stem, state) pairs
    /// found on disk.
    fn compose(&self, files: Vec<(String, StateData)>) -> StateDocument;
}

/// Built-in splitter storing each component in its own file, named after
/// the component.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerComponentSplitter;

impl StateSplitter for PerComponentSplitter {
    fn split(&self, component_name: &str, state: &StateData) -> Vec<(String, StateData)> {
        vec![(component_name.to_string(), state.clone())]
    }

    fn compose(&self, files: Vec<(String, StateData)>) -> StateDocument {
        let mut doc = StateDocument::new();
        for (stem, state) in files {
            doc.set(stem, state);
        }
        doc
    }
}

/// Directory-based storage backend: a root directory plus a splitting
/// strategy deciding how component state is laid out inside it.
pub struct DirectoryBackend {
    file_spec: String,
    root: PathBuf,
    roaming: RoamingType,
    format: StateFormat,
    splitter: Arc<dyn StateSplitter>,
    scope: Option<ScopeHandle>,
    listener: Option<Arc<dyn StorageListener>>,
    document: Arc<RwLock<Option<StateDocument>>>,
}

impl DirectoryBackend {
    pub fn new(
        file_spec: impl Into<String>,
        root: PathBuf,
        splitter: Arc<dyn StateSplitter>,
        roaming: RoamingType,
        format: StateFormat,
    ) -> Self {
        Self {
            file_spec: file_spec.into(),
            root,
            roaming,
            format,
            splitter,
            scope: None,
            listener: None,
            document: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_scope(mut self, scope: ScopeHandle) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn StorageListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn file_spec(&self) -> &str {
        &self.file_spec
    }

    /// Resolved (macro-expanded) storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self) -> Result<StateDocument> {
        if let Some(doc) = self.document.read().as_ref() {
            return Ok(doc.clone());
        }
        let doc = read_directory(&self.root, self.format, self.splitter.as_ref())?;
        *self.document.write() = Some(doc.clone());
        Ok(doc)
    }
}

impl Backend for DirectoryBackend {
    fn roaming(&self) -> RoamingType {
        self.roaming
    }

    fn start_externalization(&self) -> Option<Box<dyn ExternalizationSession>> {
        if self.scope.as_ref().is_some_and(ScopeHandle::is_disposed) {
            debug!(
                "Storage {} is disposed, refusing externalization",
                self.file_spec
            );
            return None;
        }
        Some(Box::new(DirectoryExternalizationSession {
            file_spec: self.file_spec.clone(),
            root: self.root.clone(),
            format: self.format,
            splitter: self.splitter.clone(),
            listener: self.listener.clone(),
            document: self.document.clone(),
            pending: IndexMap::new(),
        }))
    }

    fn get_state(&self, component_name: &str) -> Result<Option<StateData>> {
        Ok(self.load()?.get(component_name).cloned())
    }
}

impl fmt::Debug for DirectoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryBackend")
            .field("file_spec", &self.file_spec)
            .field("root", &self.root)
            .field("roaming", &self.roaming)
            .field("splitter", &self.splitter)
            .finish()
    }
}

/// Pass-scoped accumulator for one directory backend
struct DirectoryExternalizationSession {
    file_spec: String,
    root: PathBuf,
    format: StateFormat,
    splitter: Arc<dyn StateSplitter>,
    listener: Option<Arc<dyn StorageListener>>,
    document: Arc<RwLock<Option<StateDocument>>>,
    pending: IndexMap<String, StateData>,
}

impl ExternalizationSession for DirectoryExternalizationSession {
    fn set_state(&mut self, component_name: &str, state: StateData, _spec: &StorageSpec) {
        self.pending.insert(component_name.to_string(), state);
    }

    fn create_save_session(self: Box<Self>) -> Option<Box<dyn SaveSession>> {
        if self.pending.is_empty() {
            return None;
        }
        let current = match self.document.read().as_ref() {
            Some(doc) => doc.clone(),
            None => match read_directory(&self.root, self.format, self.splitter.as_ref()) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(
                        "Could not read {} while finalizing, treating as empty: {}",
                        self.root.display(),
                        err
                    );
                    StateDocument::new()
                }
            },
        };
        let mut merged = current.clone();
        for (name, state) in &self.pending {
            if state.is_empty() {
                merged.remove(name);
            } else {
                merged.set(name.clone(), state.clone());
            }
        }
        if merged == current {
            debug!("Storage {} unchanged, skipping save", self.file_spec);
            return None;
        }
        let session = *self;
        Some(Box::new(DirectorySaveSession {
            file_spec: session.file_spec,
            root: session.root,
            format: session.format,
            splitter: session.splitter,
            listener: session.listener,
            document: session.document,
            merged,
        }))
    }
}

/// Finalized pending writes for one directory backend
struct DirectorySaveSession {
    file_spec: String,
    root: PathBuf,
    format: StateFormat,
    splitter: Arc<dyn StateSplitter>,
    listener: Option<Arc<dyn StorageListener>>,
    document: Arc<RwLock<Option<StateDocument>>>,
    merged: StateDocument,
}

impl SaveSession for DirectorySaveSession {
    fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| StorageSystemError::io(e, "create_dir_all", self.root.clone()))?;

        // Full expected file set after this flush, stem -> serialized content.
        let mut expected: IndexMap<String, String> = IndexMap::new();
        for (name, state) in self.merged.components() {
            for (stem, part) in self.splitter.split(name, state) {
                expected.insert(stem, part.serialize(self.format)?);
            }
        }

        for (stem, content) in &expected {
            let path = self.root.join(format!("{}.{}", stem, self.format.extension()));
            write_atomic(&path, content.as_bytes())?;
        }

        // Remove state files no longer produced by the split.
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StorageSystemError::io(e, "read_dir", self.root.clone()))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| StorageSystemError::io(e, "read_dir_entry", self.root.clone()))?;
            let path = entry.path();
            if !path.is_file() || StateFormat::from_path(&path) != Some(self.format) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !expected.contains_key(stem) {
                fs::remove_file(&path)
                    .map_err(|e| StorageSystemError::io(e, "remove_file", path.clone()))?;
                debug!("Removed stale state file {}", path.display());
            }
        }

        debug!("Saved storage {} to {}", self.file_spec, self.root.display());
        *self.document.write() = Some(self.merged.clone());
        if let Some(listener) = &self.listener {
            listener.storage_saved(&self.root);
        }
        Ok(())
    }
}

/// Compose the document of a directory storage from the state files
/// currently inside it. A missing root is an empty document.
fn read_directory(
    root: &Path,
    format: StateFormat,
    splitter: &dyn StateSplitter,
) -> Result<StateDocument> {
    if !root.is_dir() {
        return Ok(StateDocument::new());
    }
    let mut files = Vec::new();
    let entries =
        fs::read_dir(root).map_err(|e| StorageSystemError::io(e, "read_dir", root.to_path_buf()))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| StorageSystemError::io(e, "read_dir_entry", root.to_path_buf()))?;
        let path = entry.path();
        if !path.is_file() || StateFormat::from_path(&path) != Some(format) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(&path)
            .map_err(|e| StorageSystemError::io(e, "read_to_string", path.clone()))?;
        files.push((stem.to_string(), StateData::deserialize(&content, format)?));
    }
    Ok(splitter.compose(files))
}
