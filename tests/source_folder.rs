//! Source Folder Integration Tests
//!
//! Folder lifecycle: spawn, staging a file through the temporary area into
//! the receiving bay, and resolving it by source ID.

use serde_json::json;
use sourcewrangler::folder::{MANIFEST_FILE, RECEIVING_BAY_DIR, TEMPORARY_DIR};
use sourcewrangler::retriever::{Retrieval, RetrieverRegistry};
use sourcewrangler::{Records, SourceError, SourceFolder};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

#[test]
fn test_spawn_then_open() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("papers");

    assert!(matches!(
        SourceFolder::open(&root),
        Err(SourceError::IncompleteSourceFolder(_))
    ));

    SourceFolder::spawn(&root).unwrap();
    for part in [RECEIVING_BAY_DIR, TEMPORARY_DIR, MANIFEST_FILE] {
        assert!(root.join(part).exists(), "missing {}", part);
    }

    let folder = SourceFolder::open(&root).unwrap();
    assert!(folder.open_manifest().unwrap().is_empty().unwrap());
}

#[test]
fn test_stage_and_resolve() {
    let temp = TempDir::new().unwrap();
    let folder = SourceFolder::spawn(temp.path()).unwrap();

    let file = folder.temporary_area().allocate("notes.pdf").unwrap();
    fs::File::create(file.path())
        .unwrap()
        .write_all(b"%PDF")
        .unwrap();
    folder.receiving_bay().accept(&file, "5-notes.pdf").unwrap();

    assert_eq!(folder.get(5).unwrap(), "5-notes.pdf");
    assert!(folder.temporary_area().available().unwrap().is_empty());
    assert!(matches!(folder.get(""), Err(SourceError::NotFound(_))));
}

#[test]
fn test_thousand_allocations_in_one_second() {
    let temp = TempDir::new().unwrap();
    let folder = SourceFolder::spawn(temp.path()).unwrap();
    let at = chrono::Utc::now();

    let names: HashSet<String> = (0..1000)
        .map(|_| {
            folder
                .temporary_area()
                .allocate_at(".txt", at)
                .unwrap()
                .file_name()
                .to_string()
        })
        .collect();
    assert_eq!(names.len(), 1000);

    assert!(matches!(
        folder.temporary_area().allocate_at(".txt", at),
        Err(SourceError::ExhaustedNamespace { .. })
    ));
}

#[tokio::test]
async fn test_fetch_record_through_file_protocol() {
    let temp = TempDir::new().unwrap();
    let folder = SourceFolder::spawn(temp.path().join("folder")).unwrap();
    let source = temp.path().join("trust.pdf");
    fs::write(&source, b"%PDF-1.3").unwrap();

    let mut catalog = folder.open_manifest().unwrap();
    let id = catalog
        .add(
            json!({
                "title": "Reflections on Trusting Trust",
                "retrieval": {"protocol": "file", "options": {"path": source.to_str().unwrap()}}
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .unwrap();

    let retrieval = Retrieval::from_record(catalog.get(id).unwrap())
        .unwrap()
        .unwrap();
    let registry = RetrieverRegistry::with_builtin().unwrap();
    let retrieved = registry
        .retrieve(&retrieval, folder.temporary_area())
        .await
        .unwrap();

    let name = format!("{}-{}", id, retrieved.file.suffix());
    folder.receiving_bay().accept(&retrieved.file, &name).unwrap();

    assert_eq!(folder.get(id).unwrap(), "0-trust.pdf");
    assert_eq!(fs::read(folder.source_path(id).unwrap()).unwrap(), b"%PDF-1.3");
    assert_eq!(retrieved.media_type, "application/pdf");
}
