use std::sync::Arc;

use log::debug;

use crate::error::Result;
use crate::storage::backend::{Backend, RoamingType};
use crate::storage::factory::{BackendKind, SplitterKind};
use crate::storage::manager::StorageManager;
use crate::storage::state::StateData;

/// Per-backend accumulator for one externalization pass.
///
/// Sessions are pass-scoped: the manager session that created one owns
/// it and discards it when the pass completes. They are never reused.
pub trait ExternalizationSession: Send {
    /// Record `state` as the pending content for `component_name`. An
    /// empty [`StateData`] clears the component's entry on commit.
    fn set_state(&mut self, component_name: &str, state: StateData, spec: &StorageSpec);

    /// Finalize the pass for this backend. `None` means nothing changed
    /// and no I/O is warranted.
    fn create_save_session(self: Box<Self>) -> Option<Box<dyn SaveSession>>;
}

/// A finalized, ready-to-flush unit of pending writes.
///
/// Ownership transfers to the caller, which is responsible for actually
/// flushing; the registry never performs the I/O itself.
pub trait SaveSession: Send {
    fn save(&self) -> Result<()>;
}

/// How a component's storage chooser resolved one spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageResolution {
    /// Write the submitted state normally
    Save,
    /// Write the cleared-state marker instead
    Clear,
    /// Leave this storage untouched
    Skip,
}

/// Optional per-component capability deciding which of several declared
/// storages actually receives a write.
pub trait StorageChooser: Send + Sync {
    fn resolve(&self, spec: &StorageSpec) -> StorageResolution;
}

/// A configuration holder that externalizes state through the manager
pub trait PersistentComponent: Send + Sync {
    /// Chooser consulted for each storage spec during externalization
    fn storage_chooser(&self) -> Option<&dyn StorageChooser> {
        None
    }

    /// Components that cannot roam have their legacy storage forced to
    /// [`RoamingType::Disabled`].
    fn roaming_compatible(&self) -> bool {
        true
    }
}

/// Direction of a legacy-storage access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Read,
    Write,
}

/// Declares one storage location for a component
#[derive(Debug, Clone)]
pub struct StorageSpec {
    pub file_spec: String,
    pub roaming: RoamingType,
    pub backend: BackendKind,
    pub splitter: SplitterKind,
    /// Deprecated storages only ever receive the cleared-state marker,
    /// so stale copies drain away as components save.
    pub deprecated: bool,
}

impl StorageSpec {
    /// Spec for a plain file-based storage
    pub fn file(file_spec: impl Into<String>) -> Self {
        Self {
            file_spec: file_spec.into(),
            roaming: RoamingType::default(),
            backend: BackendKind::Default,
            splitter: SplitterKind::None,
            deprecated: false,
        }
    }

    pub fn with_roaming(mut self, roaming: RoamingType) -> Self {
        self.roaming = roaming;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitterKind) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

/// Top-level session driving one externalization pass across every
/// backend touched by the submitted component states.
///
/// One pass is driven by a single caller sequentially; the per-backend
/// session set is pass-local and never shared across threads.
pub struct ManagerExternalizationSession<'a> {
    manager: &'a StorageManager,
    /// Per-backend sessions in first-touch order. `None` records a
    /// backend that declined the pass so it is not asked again.
    sessions: Vec<(String, Option<Box<dyn ExternalizationSession>>)>,
}

impl<'a> ManagerExternalizationSession<'a> {
    pub(crate) fn new(manager: &'a StorageManager) -> Self {
        Self {
            manager,
            sessions: Vec::new(),
        }
    }

    /// Submit one component's state to every storage it declares, in
    /// priority order.
    ///
    /// For each spec the component's chooser (when present) decides
    /// between a normal write, a clear, and a skip. Deprecated specs and
    /// `Clear` resolutions forward the cleared-state marker in place of
    /// the caller's state.
    pub fn set_state(
        &mut self,
        component: &dyn PersistentComponent,
        component_name: &str,
        state: &StateData,
        specs: &[StorageSpec],
    ) -> Result<()> {
        for spec in specs {
            let resolution = match component.storage_chooser() {
                Some(chooser) => chooser.resolve(spec),
                None => StorageResolution::Save,
            };
            if resolution == StorageResolution::Skip {
                debug!(
                    "Component {} skipped storage {}",
                    component_name, spec.file_spec
                );
                continue;
            }

            let backend = self.manager.storage_for_spec(spec)?;
            let key = StorageManager::storage_key(spec);
            let effective = if spec.deprecated || resolution == StorageResolution::Clear {
                StateData::new()
            } else {
                state.clone()
            };
            self.write_to_backend(key, backend, component_name, effective, spec);
        }
        Ok(())
    }

    /// Write directly into the component's legacy storage, bypassing the
    /// chooser. A component without a legacy location is a no-op.
    pub fn set_state_in_old_storage(
        &mut self,
        component: &dyn PersistentComponent,
        component_name: &str,
        state: &StateData,
    ) -> Result<()> {
        let Some((file_spec, backend)) = self.manager.old_storage_with_key(
            component,
            component_name,
            StorageOperation::Write,
        )?
        else {
            return Ok(());
        };
        let spec = StorageSpec::file(file_spec.as_str());
        self.write_to_backend(file_spec, backend, component_name, state.clone(), &spec);
        Ok(())
    }

    /// Lazily obtain the per-backend session for `key` (memoized for this
    /// pass only) and forward the write to it.
    fn write_to_backend(
        &mut self,
        key: String,
        backend: Arc<dyn Backend>,
        component_name: &str,
        state: StateData,
        spec: &StorageSpec,
    ) {
        let idx = match self.sessions.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                self.sessions.push((key, backend.start_externalization()));
                self.sessions.len() - 1
            }
        };
        if let Some(session) = self.sessions[idx].1.as_mut() {
            session.set_state(component_name, state, spec);
        }
    }

    /// Finalize the pass: collect the save session of every touched
    /// backend that has something to flush, in first-touch order.
    ///
    /// Consumes the pass; the per-backend accumulators do not survive it.
    /// An untouched or unchanged pass yields an empty result.
    pub fn create_save_sessions(self) -> Vec<Box<dyn SaveSession>> {
        let mut sessions = self.sessions;
        // Single-backend fast path.
        if sessions.len() == 1 {
            let (_, session) = sessions.remove(0);
            return session
                .and_then(|s| s.create_save_session())
                .into_iter()
                .collect();
        }
        sessions
            .into_iter()
            .filter_map(|(_, session)| session)
            .filter_map(|session| session.create_save_session())
            .collect()
    }
}
