use tempfile::{TempDir, tempdir};

use crate::storage::manager::StorageManager;
use crate::storage::state::StateData;

/// Create a manager rooted in a scratch directory, with a `$ROOT$` macro
/// pointing at it.
pub fn scratch_manager() -> (StorageManager, TempDir) {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let manager = StorageManager::new(temp_dir.path().to_path_buf());
    manager
        .macros()
        .add_macro("$ROOT$", temp_dir.path().to_string_lossy());
    (manager, temp_dir)
}

/// A second manager over the same scratch directory, as a fresh process
/// would construct it.
pub fn reopen_manager(temp_dir: &TempDir) -> StorageManager {
    let manager = StorageManager::new(temp_dir.path().to_path_buf());
    manager
        .macros()
        .add_macro("$ROOT$", temp_dir.path().to_string_lossy());
    manager
}

pub fn state_with(key: &str, value: &str) -> StateData {
    let mut state = StateData::new();
    state.set(key, value).expect("state value should serialize");
    state
}
