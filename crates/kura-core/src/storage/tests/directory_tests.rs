use std::sync::Arc;

use tempfile::tempdir;

use crate::error::Result;
use crate::storage::backend::{Backend, RoamingType};
use crate::storage::directory::{DirectoryBackend, PerComponentSplitter};
use crate::storage::session::StorageSpec;
use crate::storage::state::{StateData, StateFormat};

fn sample_state(value: &str) -> StateData {
    let mut state = StateData::new();
    state.set("value", value).expect("state value should serialize");
    state
}

fn directory_backend(root: std::path::PathBuf) -> DirectoryBackend {
    DirectoryBackend::new(
        "options",
        root,
        Arc::new(PerComponentSplitter),
        RoamingType::PerUser,
        StateFormat::Json,
    )
}

#[test]
fn test_split_write_and_compose_read() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let root = temp_dir.path().join("options");

    let backend = directory_backend(root.clone());
    let spec = StorageSpec::file("options");
    let mut session = backend.start_externalization().unwrap();
    session.set_state("Editor", sample_state("e"), &spec);
    session.set_state("Vcs", sample_state("v"), &spec);
    session
        .create_save_session()
        .expect("changed state should produce a save session")
        .save()?;

    // One file per component, named after it.
    assert!(root.join("Editor.json").is_file());
    assert!(root.join("Vcs.json").is_file());

    // A fresh backend composes the directory back into a document.
    let reread = directory_backend(root);
    assert_eq!(
        reread.get_state("Editor")?.unwrap().get::<String>("value").unwrap(),
        "e"
    );
    assert_eq!(
        reread.get_state("Vcs")?.unwrap().get::<String>("value").unwrap(),
        "v"
    );

    Ok(())
}

#[test]
fn test_stale_files_removed_on_commit() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let root = temp_dir.path().join("options");

    let backend = directory_backend(root.clone());
    let spec = StorageSpec::file("options");
    let mut session = backend.start_externalization().unwrap();
    session.set_state("Editor", sample_state("e"), &spec);
    session.set_state("Vcs", sample_state("v"), &spec);
    session.create_save_session().unwrap().save()?;

    // Clearing one component removes its file on the next commit.
    let mut session = backend.start_externalization().unwrap();
    session.set_state("Vcs", StateData::new(), &spec);
    session.create_save_session().unwrap().save()?;

    assert!(root.join("Editor.json").is_file());
    assert!(!root.join("Vcs.json").exists());

    Ok(())
}

#[test]
fn test_unchanged_state_yields_no_save_session() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let backend = directory_backend(temp_dir.path().join("options"));
    let spec = StorageSpec::file("options");

    let mut session = backend.start_externalization().unwrap();
    session.set_state("Editor", sample_state("same"), &spec);
    session.create_save_session().unwrap().save()?;

    let mut session = backend.start_externalization().unwrap();
    session.set_state("Editor", sample_state("same"), &spec);
    assert!(session.create_save_session().is_none());

    Ok(())
}

#[test]
fn test_foreign_files_are_ignored() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let root = temp_dir.path().join("options");
    std::fs::create_dir_all(&root).expect("Failed to create storage root");
    std::fs::write(root.join("README.txt"), "not state").expect("Failed to write foreign file");

    let backend = directory_backend(root.clone());
    let spec = StorageSpec::file("options");
    let mut session = backend.start_externalization().unwrap();
    session.set_state("Editor", sample_state("e"), &spec);
    session.create_save_session().unwrap().save()?;

    // Files outside the state format survive commits untouched.
    assert!(root.join("README.txt").is_file());

    Ok(())
}
