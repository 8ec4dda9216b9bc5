use std::sync::Arc;
use std::thread;

use crate::error::Result;
use crate::storage::backend::{Backend, RoamingType};
use crate::storage::file::FileBackend;
use crate::storage::registry::StorageRegistry;
use crate::storage::state::StateFormat;

fn file_backend(spec: &str) -> Arc<dyn Backend> {
    Arc::new(FileBackend::new(
        spec,
        std::path::PathBuf::from(spec),
        RoamingType::PerUser,
        StateFormat::Json,
    ))
}

#[test]
fn test_get_or_create_caches_one_instance() -> Result<()> {
    let registry = StorageRegistry::new();

    let first = registry.get_or_create("app.json", || Ok(file_backend("app.json")))?;
    let second = registry.get_or_create("app.json", || {
        panic!("cached key must not construct again")
    })?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.keys(), vec!["app.json".to_string()]);

    Ok(())
}

#[test]
fn test_failed_construction_caches_nothing() {
    let registry = StorageRegistry::new();

    let result = registry.get_or_create("app.json", || Err("construction failed".into()));
    assert!(result.is_err());
    assert!(registry.is_empty());

    // A later attempt under the same key may succeed.
    let retry = registry.get_or_create("app.json", || Ok(file_backend("app.json")));
    assert!(retry.is_ok());
}

#[test]
fn test_remove_is_visible_to_subsequent_get() -> Result<()> {
    let registry = StorageRegistry::new();

    let first = registry.get_or_create("app.json", || Ok(file_backend("app.json")))?;
    let evicted = registry.remove("app.json").expect("key should be cached");
    assert!(Arc::ptr_eq(&first, &evicted));

    let second = registry.get_or_create("app.json", || Ok(file_backend("app.json")))?;
    assert!(!Arc::ptr_eq(&first, &second));

    Ok(())
}

#[test]
fn test_concurrent_get_yields_identical_instance() {
    let registry = Arc::new(StorageRegistry::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .get_or_create("shared.json", || Ok(file_backend("shared.json")))
                    .expect("construction should succeed")
            })
        })
        .collect();

    let backends: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("lookup thread panicked"))
        .collect();

    for backend in &backends[1..] {
        assert!(Arc::ptr_eq(&backends[0], backend));
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_reentrant_construction() -> Result<()> {
    let registry = Arc::new(StorageRegistry::new());

    // A constructor that resolves another backend through the same
    // registry on the same thread must not deadlock.
    let inner_registry = Arc::clone(&registry);
    let backend = registry.get_or_create("outer.json", move || {
        inner_registry.get_or_create("inner.json", || Ok(file_backend("inner.json")))?;
        Ok(file_backend("outer.json"))
    })?;

    assert_eq!(backend.roaming(), RoamingType::PerUser);
    let mut keys = registry.keys();
    keys.sort();
    assert_eq!(keys, vec!["inner.json".to_string(), "outer.json".to_string()]);

    Ok(())
}

#[test]
fn test_cached_file_backends_filters_and_never_constructs() -> Result<()> {
    let registry = StorageRegistry::new();
    registry.get_or_create("app.json", || Ok(file_backend("app.json")))?;

    let cached = registry.cached_file_backends(["app.json", "never-requested.json"]);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].file_spec(), "app.json");

    // The unknown key was not materialized as a side effect.
    assert_eq!(registry.len(), 1);

    Ok(())
}
