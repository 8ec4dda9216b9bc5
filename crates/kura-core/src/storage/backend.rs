use std::any::Any;
use std::fmt::{self, Debug};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::storage::session::ExternalizationSession;
use crate::storage::state::StateData;

/// Whether a configuration unit may sync across machines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoamingType {
    /// Sync for this user on every machine
    #[default]
    PerUser,
    /// Sync only between machines running the same platform
    PerPlatform,
    /// Never leaves this machine
    Disabled,
}

impl fmt::Display for RoamingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoamingType::PerUser => "per-user",
            RoamingType::PerPlatform => "per-platform",
            RoamingType::Disabled => "disabled",
        };
        write!(f, "{}", name)
    }
}

/// Cloneable handle scoping backends to the lifetime of their owner.
///
/// Disposing the handle makes every backend holding it refuse new
/// externalization sessions.
#[derive(Debug, Clone, Default)]
pub struct ScopeHandle(Arc<AtomicBool>);

impl ScopeHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn dispose(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer notified after a backend flushes to disk
pub trait StorageListener: Send + Sync {
    fn storage_saved(&self, path: &Path);
}

/// A persistence unit for one logical configuration key.
///
/// Backends are created and owned exclusively by the storage registry;
/// callers obtain them through the manager and never construct file- or
/// directory-based variants themselves.
pub trait Backend: Any + Send + Sync + Debug {
    /// Roaming classification assigned at construction
    fn roaming(&self) -> RoamingType;

    /// Begin accumulating writes for one externalization pass.
    ///
    /// Returns `None` when the backend cannot meaningfully accept writes
    /// (its scope has been disposed); callers treat that as a silent
    /// skip, not an error.
    fn start_externalization(&self) -> Option<Box<dyn ExternalizationSession>>;

    /// Read one component's persisted state, loading the backing
    /// document on first access.
    fn get_state(&self, component_name: &str) -> Result<Option<StateData>>;
}
