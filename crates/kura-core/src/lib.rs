// Core subsystems of the kura configuration storage engine.
pub mod error;
pub mod lifecycle;
pub mod macros;
pub mod storage;

// Re-export key public types/traits for easier use by the binary and
// embedding applications.
pub use error::{Error, Result};
pub use lifecycle::LifecycleComponent;
pub use macros::MacroTable;
pub use storage::{
    Backend, RoamingType, StorageManager, StorageSpec, StreamProvider,
};

#[cfg(test)]
mod tests;
