use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::lifecycle::LifecycleComponent;
use crate::macros::{MacroTable, path_macros};
use crate::storage::backend::{Backend, RoamingType, ScopeHandle, StorageListener};
use crate::storage::directory::DirectoryBackend;
use crate::storage::error::StorageSystemError;
use crate::storage::factory::{BackendKind, FactoryRegistry, SplitterKind};
use crate::storage::file::{EmptyDocumentFn, FileBackend};
use crate::storage::provider::StreamProvider;
use crate::storage::registry::StorageRegistry;
use crate::storage::session::{
    ManagerExternalizationSession, PersistentComponent, StorageOperation, StorageSpec,
};
use crate::storage::state::{StateDocument, StateFormat};

/// Hook resolving a component's legacy file spec, or `None` when no
/// migration applies.
pub type OldStorageFn =
    Arc<dyn Fn(&dyn PersistentComponent, &str, StorageOperation) -> Option<String> + Send + Sync>;

/// Validation hook invoked before a file-based backend is built
pub type BeforeFileCreateFn = Arc<dyn Fn(&str, &Path) -> Result<()> + Send + Sync>;

/// Creation-time customization points of a [`StorageManager`].
///
/// Concrete managers differ in how storages come into being, not in how
/// they are cached or externalized, so the variation points are plain
/// configuration fields rather than subclass hooks.
#[derive(Clone)]
pub struct ManagerPolicy {
    /// Relaxes the file-extension construction rule. Interactive
    /// environments treat an extension-less spec as a hard error;
    /// headless ones tolerate it.
    pub headless: bool,
    /// Format for state files whose extension is not recognized
    pub default_format: StateFormat,
    /// Emit a leading document-start marker where the format defines one
    pub uses_prolog: bool,
    /// Produces the initial document of a storage whose file does not
    /// exist yet.
    pub make_empty_state: EmptyDocumentFn,
    /// Validation hook invoked before a file-based backend is built
    pub before_file_backend_create: Option<BeforeFileCreateFn>,
    /// Legacy-storage resolution hook, see
    /// [`StorageManager::get_old_storage`]
    pub old_storage_spec: Option<OldStorageFn>,
}

impl Default for ManagerPolicy {
    fn default() -> Self {
        Self {
            headless: false,
            default_format: StateFormat::Json,
            uses_prolog: false,
            make_empty_state: Arc::new(|_, _| StateDocument::new()),
            before_file_backend_create: None,
            old_storage_spec: None,
        }
    }
}

impl fmt::Debug for ManagerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerPolicy")
            .field("headless", &self.headless)
            .field("default_format", &self.default_format)
            .field("uses_prolog", &self.uses_prolog)
            .finish_non_exhaustive()
    }
}

/// Process-scoped configuration storage manager.
///
/// Owns the macro table, the backend cache and the pluggable-backend
/// factories for one application or project context; constructed with
/// that context and torn down with it through [`LifecycleComponent`].
pub struct StorageManager {
    name: &'static str,
    base_path: PathBuf,
    macros: Arc<MacroTable>,
    registry: StorageRegistry,
    factories: FactoryRegistry,
    policy: ManagerPolicy,
    scope: ScopeHandle,
    listener: RwLock<Option<Arc<dyn StorageListener>>>,
    stream_provider: RwLock<Option<Arc<dyn StreamProvider>>>,
}

impl StorageManager {
    /// Create a manager with the default policy
    pub fn new(base_path: PathBuf) -> Self {
        Self::with_policy(base_path, ManagerPolicy::default())
    }

    pub fn with_policy(base_path: PathBuf, policy: ManagerPolicy) -> Self {
        Self {
            name: "StorageManager",
            base_path,
            macros: Arc::new(MacroTable::new()),
            registry: StorageRegistry::new(),
            factories: FactoryRegistry::new(),
            policy,
            scope: ScopeHandle::new(),
            listener: RwLock::new(None),
            stream_provider: RwLock::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The macro table owned by this manager
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Factories for pluggable backend and splitter classes
    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    pub fn policy(&self) -> &ManagerPolicy {
        &self.policy
    }

    /// Lifecycle scope handed to every backend this manager constructs
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    /// Directory the default macro seeding points application specs at
    pub fn app_config_path(&self) -> PathBuf {
        self.base_path.join("config")
    }

    /// Location of the workspace-local file
    pub fn workspace_file_path(&self) -> PathBuf {
        self.base_path.join("workspace.json")
    }

    /// Change listener handed to every backend constructed afterwards
    pub fn set_listener(&self, listener: Arc<dyn StorageListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Stream provider pass-through: stored here, handed to every
    /// file-based backend constructed afterwards.
    pub fn set_stream_provider(&self, provider: Arc<dyn StreamProvider>) {
        *self.stream_provider.write() = Some(provider);
    }

    pub fn stream_provider(&self) -> Option<Arc<dyn StreamProvider>> {
        self.stream_provider.read().clone()
    }

    /// Cache key for a spec. Custom backend kinds collapse onto their
    /// type name so at most one instance exists per pluggable class,
    /// however many file specs request it.
    pub fn storage_key(spec: &StorageSpec) -> String {
        match spec.backend {
            BackendKind::Custom { type_name, .. } => type_name.to_string(),
            BackendKind::Default => spec.file_spec.clone(),
        }
    }

    pub fn storage_for_spec(&self, spec: &StorageSpec) -> Result<Arc<dyn Backend>> {
        self.storage(&spec.file_spec, spec.roaming, spec.backend, spec.splitter)
    }

    /// Return the cached backend for the key derived from the arguments,
    /// constructing and caching one on first request.
    ///
    /// Safe under concurrent calls: the whole check-then-create sequence
    /// runs inside the registry's reentrant lock, so all callers see the
    /// identical instance.
    pub fn storage(
        &self,
        file_spec: &str,
        roaming: RoamingType,
        backend: BackendKind,
        splitter: SplitterKind,
    ) -> Result<Arc<dyn Backend>> {
        let key = match backend {
            BackendKind::Custom { type_name, .. } => type_name.to_string(),
            BackendKind::Default => file_spec.to_string(),
        };
        self.registry
            .get_or_create(&key, || self.create_backend(file_spec, roaming, backend, splitter))
    }

    fn create_backend(
        &self,
        file_spec: &str,
        roaming: RoamingType,
        backend: BackendKind,
        splitter: SplitterKind,
    ) -> Result<Arc<dyn Backend>> {
        if let BackendKind::Custom { type_id, type_name } = backend {
            // Pluggable kinds are a pure hand-off to the factory: no
            // macro expansion, no file-system checks.
            return self.factories.create_backend(type_id, type_name);
        }

        let path = self.expand_file_spec(file_spec)?;

        if let SplitterKind::Custom { type_id, type_name } = splitter {
            let splitter = self.factories.create_splitter(type_id, type_name)?;
            debug!(
                "Creating directory storage for {} at {}",
                file_spec,
                path.display()
            );
            let mut backend = DirectoryBackend::new(
                file_spec,
                path,
                splitter,
                roaming,
                self.policy.default_format,
            )
            .with_scope(self.scope.clone());
            if let Some(listener) = self.listener.read().clone() {
                backend = backend.with_listener(listener);
            }
            return Ok(Arc::new(backend));
        }

        if path.extension().is_none() && !self.policy.headless {
            return Err(Error::StorageSystem(StorageSystemError::MissingExtension {
                file_spec: file_spec.to_string(),
                path,
            }));
        }
        if let Some(hook) = &self.policy.before_file_backend_create {
            hook(file_spec, &path)?;
        }

        // Workspace-local data never roams, whatever the caller asked for.
        let roaming = if file_spec == path_macros::WORKSPACE_FILE {
            RoamingType::Disabled
        } else {
            roaming
        };

        let format = StateFormat::from_path(&path).unwrap_or(self.policy.default_format);
        debug!(
            "Creating file storage for {} at {}",
            file_spec,
            path.display()
        );
        let mut backend = FileBackend::new(file_spec, path, roaming, format)
            .with_prolog(self.policy.uses_prolog)
            .with_empty_document(self.policy.make_empty_state.clone())
            .with_scope(self.scope.clone());
        if let Some(listener) = self.listener.read().clone() {
            backend = backend.with_listener(listener);
        }
        if let Some(provider) = self.stream_provider.read().clone() {
            backend = backend.with_stream_provider(provider);
        }
        Ok(Arc::new(backend))
    }

    /// Expand a file spec through the macro table into a physical path
    pub fn expand_file_spec(&self, file_spec: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(self.macros.expand(file_spec)?))
    }

    /// Collapse a physical path back into its portable spec form
    pub fn collapse_path(&self, path: &Path) -> String {
        self.macros.collapse(&path.to_string_lossy())
    }

    /// File-based backends already resident for `keys`; never constructs
    pub fn cached_file_backends<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Arc<FileBackend>> {
        self.registry.cached_file_backends(keys)
    }

    /// Evict `key` from the cache without flushing or closing it
    pub fn remove_storage(&self, key: &str) -> Option<Arc<dyn Backend>> {
        self.registry.remove(key)
    }

    /// Snapshot of the currently cached storage keys
    pub fn storage_keys(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Resolve a component's legacy storage through the policy hook.
    ///
    /// Returns `None` when no hook is installed or the hook reports no
    /// migration for this component. The roaming classification is
    /// inferred from the component: forced to disabled for
    /// roaming-incompatible components, per-user otherwise.
    pub fn get_old_storage(
        &self,
        component: &dyn PersistentComponent,
        component_name: &str,
        operation: StorageOperation,
    ) -> Result<Option<Arc<dyn Backend>>> {
        Ok(self
            .old_storage_with_key(component, component_name, operation)?
            .map(|(_, backend)| backend))
    }

    pub(crate) fn old_storage_with_key(
        &self,
        component: &dyn PersistentComponent,
        component_name: &str,
        operation: StorageOperation,
    ) -> Result<Option<(String, Arc<dyn Backend>)>> {
        let Some(hook) = &self.policy.old_storage_spec else {
            return Ok(None);
        };
        let Some(file_spec) = hook(component, component_name, operation) else {
            return Ok(None);
        };
        let roaming = if component.roaming_compatible() {
            RoamingType::PerUser
        } else {
            RoamingType::Disabled
        };
        debug!(
            "Resolving legacy storage {} for component {}",
            file_spec, component_name
        );
        let backend = self.storage(&file_spec, roaming, BackendKind::Default, SplitterKind::None)?;
        Ok(Some((file_spec, backend)))
    }

    /// Begin one externalization pass
    pub fn start_externalization(&self) -> ManagerExternalizationSession<'_> {
        ManagerExternalizationSession::new(self)
    }

    /// Seed the macros every default installation relies on
    fn seed_default_macros(&self) {
        self.macros.add_macro(
            path_macros::APP_CONFIG,
            self.app_config_path().to_string_lossy().into_owned(),
        );
        self.macros.add_macro(
            path_macros::WORKSPACE_FILE,
            self.workspace_file_path().to_string_lossy().into_owned(),
        );
    }
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl LifecycleComponent for StorageManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.seed_default_macros();
        let config_dir = self.app_config_path();
        tokio::fs::create_dir_all(&config_dir)
            .await
            .map_err(|e| StorageSystemError::io(e, "create_dir_all", config_dir.clone()))?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Backends scoped to this manager refuse further writes once the
        // scope is disposed.
        self.scope.dispose();
        self.registry.clear();
        Ok(())
    }
}
