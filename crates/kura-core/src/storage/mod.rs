pub mod backend;
pub mod directory;
pub mod error;
pub mod factory;
pub mod file;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod session;
pub mod state;

/// Re-export key types
pub use backend::{Backend, RoamingType, ScopeHandle, StorageListener};
pub use directory::{DirectoryBackend, PerComponentSplitter, StateSplitter};
pub use factory::{BackendFactory, BackendKind, FactoryRegistry, SplitterFactory, SplitterKind};
pub use file::FileBackend;
pub use manager::{ManagerPolicy, StorageManager};
pub use provider::StreamProvider;
pub use registry::StorageRegistry;
pub use session::{
    ExternalizationSession, ManagerExternalizationSession, PersistentComponent, SaveSession,
    StorageChooser, StorageOperation, StorageResolution, StorageSpec,
};
pub use state::{StateData, StateDocument, StateFormat};

// Test module declaration
#[cfg(test)]
mod tests;
