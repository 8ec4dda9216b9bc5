use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::lifecycle::LifecycleComponent;
use crate::storage::backend::{Backend, RoamingType};
use crate::storage::factory::{BackendKind, SplitterKind};
use crate::storage::file::read_document;
use crate::storage::session::{
    ExternalizationSession, PersistentComponent, SaveSession, StorageSpec,
};
use crate::storage::state::{StateData, StateDocument, StateFormat};

use super::common::{scratch_manager, state_with};

struct PlainComponent;

impl PersistentComponent for PlainComponent {}

#[tokio::test]
async fn test_migration_pass_drains_deprecated_storage() -> Result<()> {
    let (manager, temp_dir) = scratch_manager();
    manager.initialize().await?;

    // Seed the legacy location as an old installation left it.
    std::fs::write(
        temp_dir.path().join("old.json"),
        r#"{"Editor": {"font": "serif"}}"#,
    )
    .expect("Failed to seed legacy file");

    // The component declares its new home first and its legacy location
    // as deprecated; one pass moves the data over.
    let specs = [
        StorageSpec::file("$ROOT$/new.json"),
        StorageSpec::file("$ROOT$/old.json").deprecated(),
    ];
    let mut session = manager.start_externalization();
    session.set_state(&PlainComponent, "Editor", &state_with("font", "mono"), &specs)?;
    let save_sessions = session.create_save_sessions();
    assert_eq!(save_sessions.len(), 2);
    for save in save_sessions {
        save.save()?;
    }

    let new_doc = read_document(&temp_dir.path().join("new.json"), StateFormat::Json)?
        .expect("new location should exist");
    assert_eq!(
        new_doc.get("Editor").unwrap().get::<String>("font").unwrap(),
        "mono"
    );
    // The deprecated file held only Editor, so draining it deletes it.
    assert!(!temp_dir.path().join("old.json").exists());

    Ok(())
}

#[derive(Debug, Default)]
struct MemoryBackend {
    states: Arc<RwLock<StateDocument>>,
}

impl Backend for MemoryBackend {
    fn roaming(&self) -> RoamingType {
        RoamingType::Disabled
    }

    fn start_externalization(&self) -> Option<Box<dyn ExternalizationSession>> {
        Some(Box::new(MemorySession {
            states: self.states.clone(),
            pending: Vec::new(),
        }))
    }

    fn get_state(&self, component_name: &str) -> Result<Option<StateData>> {
        Ok(self.states.read().get(component_name).cloned())
    }
}

struct MemorySession {
    states: Arc<RwLock<StateDocument>>,
    pending: Vec<(String, StateData)>,
}

impl ExternalizationSession for MemorySession {
    fn set_state(&mut self, component_name: &str, state: StateData, _spec: &StorageSpec) {
        self.pending.push((component_name.to_string(), state));
    }

    fn create_save_session(self: Box<Self>) -> Option<Box<dyn SaveSession>> {
        if self.pending.is_empty() {
            return None;
        }
        let session = *self;
        Some(Box::new(MemorySaveSession {
            states: session.states,
            pending: session.pending,
        }))
    }
}

struct MemorySaveSession {
    states: Arc<RwLock<StateDocument>>,
    pending: Vec<(String, StateData)>,
}

impl SaveSession for MemorySaveSession {
    fn save(&self) -> Result<()> {
        let mut doc = self.states.write();
        for (name, state) in &self.pending {
            doc.set(name.clone(), state.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_mixed_backends_in_one_pass() -> Result<()> {
    let (manager, temp_dir) = scratch_manager();
    manager.initialize().await?;
    manager
        .factories()
        .register_backend::<MemoryBackend>(|| -> Result<Arc<dyn Backend>> {
            Ok(Arc::new(MemoryBackend::default()))
        });

    let file_specs = [StorageSpec::file("$ROOT$/app.json")];
    let custom_specs =
        [StorageSpec::file("memory").with_backend(BackendKind::custom::<MemoryBackend>())];

    let mut session = manager.start_externalization();
    session.set_state(&PlainComponent, "OnDisk", &state_with("k", "disk"), &file_specs)?;
    session.set_state(&PlainComponent, "InMemory", &state_with("k", "mem"), &custom_specs)?;
    let save_sessions = session.create_save_sessions();
    assert_eq!(save_sessions.len(), 2);
    for save in save_sessions {
        save.save()?;
    }

    assert!(temp_dir.path().join("app.json").is_file());
    let memory = manager.storage(
        "memory",
        RoamingType::PerUser,
        BackendKind::custom::<MemoryBackend>(),
        SplitterKind::None,
    )?;
    let state = memory.get_state("InMemory")?.expect("custom state expected");
    assert_eq!(state.get::<String>("k").unwrap(), "mem");

    Ok(())
}

#[tokio::test]
async fn test_second_identical_pass_is_a_noop() -> Result<()> {
    let (manager, _temp_dir) = scratch_manager();
    manager.initialize().await?;

    let specs = [StorageSpec::file("$ROOT$/app.json")];
    let state = state_with("k", "v");

    let mut session = manager.start_externalization();
    session.set_state(&PlainComponent, "Editor", &state, &specs)?;
    for save in session.create_save_sessions() {
        save.save()?;
    }

    // Same state again: the backend detects no change and the pass
    // produces no save sessions at all.
    let mut session = manager.start_externalization();
    session.set_state(&PlainComponent, "Editor", &state, &specs)?;
    assert!(session.create_save_sessions().is_empty());

    Ok(())
}
