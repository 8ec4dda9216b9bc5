use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::storage::backend::{Backend, RoamingType, ScopeHandle, StorageListener};
use crate::storage::error::StorageSystemError;
use crate::storage::provider::StreamProvider;
use crate::storage::session::{ExternalizationSession, SaveSession, StorageSpec};
use crate::storage::state::{StateData, StateDocument, StateFormat};

/// Factory for the initial document of a storage whose file does not
/// exist yet.
pub type EmptyDocumentFn = Arc<dyn Fn(&str, &Path) -> StateDocument + Send + Sync>;

/// File-based storage backend: one physical file, lazily read on first
/// access and written atomically on save-session flush.
pub struct FileBackend {
    file_spec: String,
    path: PathBuf,
    roaming: RoamingType,
    format: StateFormat,
    uses_prolog: bool,
    make_empty_document: EmptyDocumentFn,
    scope: Option<ScopeHandle>,
    listener: Option<Arc<dyn StorageListener>>,
    stream_provider: Option<Arc<dyn StreamProvider>>,
    document: Arc<RwLock<Option<StateDocument>>>,
}

impl FileBackend {
    pub fn new(
        file_spec: impl Into<String>,
        path: PathBuf,
        roaming: RoamingType,
        format: StateFormat,
    ) -> Self {
        Self {
            file_spec: file_spec.into(),
            path,
            roaming,
            format,
            uses_prolog: false,
            make_empty_document: Arc::new(|_, _| StateDocument::new()),
            scope: None,
            listener: None,
            stream_provider: None,
            document: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_prolog(mut self, uses_prolog: bool) -> Self {
        self.uses_prolog = uses_prolog;
        self
    }

    pub fn with_empty_document(mut self, factory: EmptyDocumentFn) -> Self {
        self.make_empty_document = factory;
        self
    }

    pub fn with_scope(mut self, scope: ScopeHandle) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn StorageListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_stream_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.stream_provider = Some(provider);
        self
    }

    /// The portable spec this backend was requested under
    pub fn file_spec(&self) -> &str {
        &self.file_spec
    }

    /// Resolved (macro-expanded) location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StateFormat {
        self.format
    }

    /// Load (or return the cached) backing document.
    ///
    /// A missing local file falls back to the stream provider's remote
    /// copy, then to the empty-document factory.
    fn load(&self) -> Result<StateDocument> {
        if let Some(doc) = self.document.read().as_ref() {
            return Ok(doc.clone());
        }
        let doc = match read_document(&self.path, self.format)? {
            Some(doc) => doc,
            None => match self.remote_document()? {
                Some(doc) => doc,
                None => (self.make_empty_document)(&self.file_spec, &self.path),
            },
        };
        *self.document.write() = Some(doc.clone());
        Ok(doc)
    }

    fn remote_document(&self) -> Result<Option<StateDocument>> {
        let Some(provider) = &self.stream_provider else {
            return Ok(None);
        };
        let Some(bytes) = provider.read(&self.file_spec)? else {
            return Ok(None);
        };
        debug!("Loaded {} from stream provider", self.file_spec);
        let content = String::from_utf8_lossy(&bytes);
        Ok(Some(StateDocument::deserialize(&content, self.format)?))
    }
}

impl Backend for FileBackend {
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
        Some(Box::new(FileExternalizationSession {
            file_spec: self.file_spec.clone(),
            path: self.path.clone(),
            format: self.format,
            uses_prolog: self.uses_prolog,
            make_empty_document: self.make_empty_document.clone(),
            listener: self.listener.clone(),
            stream_provider: self.stream_provider.clone(),
            document: self.document.clone(),
            pending: IndexMap::new(),
        }))
    }

    fn get_state(&self, component_name: &str) -> Result<Option<StateData>> {
        Ok(self.load()?.get(component_name).cloned())
    }
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("file_spec", &self.file_spec)
            .field("path", &self.path)
            .field("roaming", &self.roaming)
            .field("format", &self.format)
            .finish()
    }
}

/// Pass-scoped accumulator for one file backend
struct FileExternalizationSession {
    file_spec: String,
    path: PathBuf,
    format: StateFormat,
    uses_prolog: bool,
    make_empty_document: EmptyDocumentFn,
    listener: Option<Arc<dyn StorageListener>>,
    stream_provider: Option<Arc<dyn StreamProvider>>,
    document: Arc<RwLock<Option<StateDocument>>>,
    pending: IndexMap<String, StateData>,
}

impl FileExternalizationSession {
    /// Snapshot of the document the pending writes apply to. An
    /// unreadable existing file degrades to the empty document; the
    /// subsequent save overwrites it.
    fn current_document(&self) -> StateDocument {
        if let Some(doc) = self.document.read().as_ref() {
            return doc.clone();
        }
        match read_document(&self.path, self.format) {
            Ok(Some(doc)) => doc,
            Ok(None) => (self.make_empty_document)(&self.file_spec, &self.path),
            Err(err) => {
                warn!(
                    "Could not read {} while finalizing, treating as empty: {}",
                    self.path.display(),
                    err
                );
                StateDocument::new()
            }
        }
    }
}

impl ExternalizationSession for FileExternalizationSession {
    fn set_state(&mut self, component_name: &str, state: StateData, _spec: &StorageSpec) {
        self.pending.insert(component_name.to_string(), state);
    }

    fn create_save_session(self: Box<Self>) -> Option<Box<dyn SaveSession>> {
        if self.pending.is_empty() {
            return None;
        }
        let current = self.current_document();
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
        Some(Box::new(FileSaveSession {
            file_spec: session.file_spec,
            path: session.path,
            format: session.format,
            uses_prolog: session.uses_prolog,
            listener: session.listener,
            stream_provider: session.stream_provider,
            document: session.document,
            merged,
        }))
    }
}

/// Finalized pending writes for one file backend
struct FileSaveSession {
    file_spec: String,
    path: PathBuf,
    format: StateFormat,
    uses_prolog: bool,
    listener: Option<Arc<dyn StorageListener>>,
    stream_provider: Option<Arc<dyn StreamProvider>>,
    document: Arc<RwLock<Option<StateDocument>>>,
    merged: StateDocument,
}

impl SaveSession for FileSaveSession {
    fn save(&self) -> Result<()> {
        if self.merged.is_empty() {
            // A document with no components left has nothing worth
            // keeping on disk.
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| {
                    StorageSystemError::io(e, "remove_file", self.path.clone())
                })?;
                debug!("Removed empty storage file {}", self.path.display());
            }
        } else {
            let content = self.merged.serialize(self.format, self.uses_prolog)?;
            write_atomic(&self.path, content.as_bytes())?;
            debug!("Saved storage {} to {}", self.file_spec, self.path.display());
            if let Some(provider) = &self.stream_provider {
                // Mirroring is best-effort; a remote failure must not
                // undo a successful local flush.
                if let Err(err) = provider.write(&self.file_spec, content.as_bytes()) {
                    warn!("Stream provider rejected {}: {}", self.file_spec, err);
                }
            }
        }
        *self.document.write() = Some(self.merged.clone());
        if let Some(listener) = &self.listener {
            listener.storage_saved(&self.path);
        }
        Ok(())
    }
}

/// Read and parse the document at `path`. `Ok(None)` means the file does
/// not exist.
pub(crate) fn read_document(path: &Path, format: StateFormat) -> Result<Option<StateDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| StorageSystemError::io(e, "read_to_string", path.to_path_buf()))?;
    Ok(Some(StateDocument::deserialize(&content, format)?))
}

/// Write `contents` to `path` atomically: staged in a named temporary
/// file in the target directory, then persisted over the target.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::StorageSystem(StorageSystemError::InvalidPath {
            path: path.to_path_buf(),
            reason: "cannot write to a path without a parent directory".to_string(),
        })
    })?;
    if !parent.is_dir() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageSystemError::io(e, "create_dir_all", parent.to_path_buf()))?;
    }

    let temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| StorageSystemError::io(e, "create_temp_file", parent.to_path_buf()))?;
    temp_file
        .as_file()
        .write_all(contents)
        .map_err(|e| StorageSystemError::io(e, "write_to_temp_file", temp_file.path().to_path_buf()))?;
    temp_file
        .persist(path)
        .map_err(|e| StorageSystemError::io(e.error, "persist_temp_file", path.to_path_buf()))?;

    Ok(())
}
