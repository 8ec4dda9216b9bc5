use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::storage::backend::Backend;
use crate::storage::directory::StateSplitter;
use crate::storage::error::StorageSystemError;

/// Identifies which backend implementation a storage spec requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// File- or directory-based storage owned by the manager
    #[default]
    Default,
    /// A pluggable implementation resolved through the factory registry
    Custom {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl BackendKind {
    /// Kind for the pluggable backend class `T`.
    ///
    /// The type name doubles as the registry cache key, so at most one
    /// instance of `T` exists regardless of how many file specs request
    /// it.
    pub fn custom<T: Backend>() -> Self {
        BackendKind::Custom {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, BackendKind::Default)
    }
}

/// Identifies the splitting strategy of a directory-based storage spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitterKind {
    /// No splitting; the spec designates a single file
    #[default]
    None,
    Custom {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl SplitterKind {
    pub fn custom<T: StateSplitter + 'static>() -> Self {
        SplitterKind::Custom {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SplitterKind::None)
    }
}

/// Produces pluggable backend instances on demand
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Backend>>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Arc<dyn Backend>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn Backend>> {
        self()
    }
}

/// Produces splitter instances for directory-based backends
pub trait SplitterFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn StateSplitter>>;
}

impl<F> SplitterFactory for F
where
    F: Fn() -> Result<Arc<dyn StateSplitter>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn StateSplitter>> {
        self()
    }
}

/// Registry of pluggable backend and splitter factories, keyed by the
/// concrete type they produce.
///
/// Every `create_*` call invokes the factory anew; instance caching is
/// the storage registry's job, not this one's. Factory failures
/// propagate unchanged and nothing is recorded for the failed call.
#[derive(Default)]
pub struct FactoryRegistry {
    backends: RwLock<HashMap<TypeId, Arc<dyn BackendFactory>>>,
    splitters: RwLock<HashMap<TypeId, Arc<dyn SplitterFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory producing backend class `T`
    pub fn register_backend<T: Backend>(&self, factory: impl BackendFactory + 'static) {
        self.backends
            .write()
            .insert(TypeId::of::<T>(), Arc::new(factory));
    }

    /// Register the factory producing splitter class `T`
    pub fn register_splitter<T: StateSplitter + 'static>(
        &self,
        factory: impl SplitterFactory + 'static,
    ) {
        self.splitters
            .write()
            .insert(TypeId::of::<T>(), Arc::new(factory));
    }

    /// Resolve a fresh backend instance for a custom kind
    pub fn create_backend(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self.backends.read().get(&type_id).cloned().ok_or(
            Error::StorageSystem(StorageSystemError::BackendFactoryNotRegistered { type_name }),
        )?;
        factory.create()
    }

    /// Resolve a fresh splitter instance for a custom kind
    pub fn create_splitter(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn StateSplitter>> {
        let factory = self.splitters.read().get(&type_id).cloned().ok_or(
            Error::StorageSystem(StorageSystemError::SplitterFactoryNotRegistered { type_name }),
        )?;
        factory.create()
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("backends", &self.backends.read().len())
            .field("splitters", &self.splitters.read().len())
            .finish()
    }
}
