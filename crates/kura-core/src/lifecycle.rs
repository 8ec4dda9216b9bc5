use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Result;

/// Core lifecycle trait for long-lived engine components.
///
/// A [`StorageManager`](crate::storage::StorageManager) is constructed
/// once per application or project context and torn down with it;
/// embedders drive that lifecycle through this trait.
#[async_trait]
pub trait LifecycleComponent: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
