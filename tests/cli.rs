//! CLI Integration Tests
//!
//! Drives the built-in commands through the registry against a temporary
//! folder, then checks the manifest and receiving bay they leave behind.

use serde_json::json;
use sourcewrangler::cli::{CommandRegistry, Context};
use sourcewrangler::config::ResolvedConfig;
use sourcewrangler::manifest::catalog::lock_path;
use sourcewrangler::{CatalogOptions, Records, RetrieverRegistry, SourceFolder};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn context_for(folder: &Path, catalog: CatalogOptions) -> Context {
    let config = ResolvedConfig {
        folder: folder.to_path_buf(),
        catalog,
        config_file: None,
    };
    Context::new(config, RetrieverRegistry::with_builtin().unwrap())
}

async fn sw(ctx: &Context, args: &[&str]) -> anyhow::Result<()> {
    let commands = CommandRegistry::with_builtin().unwrap();
    let mut argv = vec!["sw"];
    argv.extend_from_slice(args);
    let matches = commands.build_cli().try_get_matches_from(argv)?;
    commands.dispatch(ctx, &matches).await
}

#[tokio::test]
async fn test_init_add_fetch() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("sources");
    let ctx = context_for(&root, CatalogOptions::default());

    sw(&ctx, &["init"]).await.unwrap();
    assert!(SourceFolder::check(&root));

    let source = temp.path().join("lambda.pdf");
    fs::write(&source, b"lambda the ultimate").unwrap();
    let retrieval = json!({"protocol": "file", "options": {"path": source.to_str().unwrap()}});

    sw(
        &ctx,
        &["add", "-t", "Lambda the Ultimate", "-a", "Steele", "--retrieval", &retrieval.to_string()],
    )
    .await
    .unwrap();
    sw(&ctx, &["fetch", "0"]).await.unwrap();

    let folder = SourceFolder::open(&root).unwrap();
    assert_eq!(folder.get(0).unwrap(), "0-lambda.pdf");

    let catalog = folder.open_manifest().unwrap();
    let record = catalog.get(0).unwrap();
    assert_eq!(record["author"], json!("Steele"));
    assert_eq!(record["media_type"], json!("application/pdf"));
    assert_eq!(record["sha256"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_refetch_leaves_no_temporary_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("sources");
    let ctx = context_for(&root, CatalogOptions::default());
    sw(&ctx, &["init"]).await.unwrap();

    let source = temp.path().join("a.pdf");
    fs::write(&source, b"first copy").unwrap();
    let retrieval = json!({"protocol": "file", "options": {"path": source.to_str().unwrap()}});
    sw(&ctx, &["add", "-t", "A", "--retrieval", &retrieval.to_string()])
        .await
        .unwrap();

    sw(&ctx, &["fetch", "0"]).await.unwrap();
    assert!(sw(&ctx, &["fetch", "0"]).await.is_err());

    let folder = SourceFolder::open(&root).unwrap();
    assert!(folder.temporary_area().available().unwrap().is_empty());
    assert_eq!(folder.receiving_bay().available().unwrap(), vec!["0-a.pdf".to_string()]);
    assert_eq!(fs::read(folder.source_path(0).unwrap()).unwrap(), b"first copy");
}

#[tokio::test]
async fn test_add_rejects_bad_retrieval() {
    let temp = TempDir::new().unwrap();
    let ctx = context_for(temp.path(), CatalogOptions::default());
    sw(&ctx, &["init"]).await.unwrap();

    let unknown = r#"{"protocol": "gopher", "options": {}}"#;
    assert!(sw(&ctx, &["add", "-t", "x", "--retrieval", unknown]).await.is_err());

    let missing_path = r#"{"protocol": "file", "options": {}}"#;
    assert!(sw(&ctx, &["add", "-t", "x", "--retrieval", missing_path]).await.is_err());

    assert!(sw(&ctx, &["add"]).await.is_err());

    let catalog = SourceFolder::open(temp.path()).unwrap().open_manifest().unwrap();
    assert_eq!(catalog.len().unwrap(), 0);
}

#[tokio::test]
async fn test_add_commits_without_autocommit() {
    let temp = TempDir::new().unwrap();
    let options = CatalogOptions {
        autocommit: false,
        lock: true,
    };
    let ctx = context_for(temp.path(), options);
    sw(&ctx, &["init"]).await.unwrap();

    sw(&ctx, &["add", "-t", "Manual"]).await.unwrap();

    let catalog = SourceFolder::open(temp.path()).unwrap().open_manifest().unwrap();
    assert_eq!(catalog.search("title", "Manual", false).unwrap(), vec![0]);
}

#[tokio::test]
async fn test_commands_release_lock() {
    let temp = TempDir::new().unwrap();
    let ctx = context_for(temp.path(), CatalogOptions::default());
    sw(&ctx, &["init"]).await.unwrap();
    sw(&ctx, &["add", "-t", "One", "-c", "paper"]).await.unwrap();

    sw(&ctx, &["values", "-c"]).await.unwrap();
    sw(&ctx, &["search", "title", "O.e", "-r"]).await.unwrap();
    sw(&ctx, &["show", "0"]).await.unwrap();
    assert!(sw(&ctx, &["show", "7"]).await.is_err());
    assert!(sw(&ctx, &["fetch", "0"]).await.is_err());

    let manifest = SourceFolder::open(temp.path()).unwrap().manifest_path();
    assert!(!lock_path(&manifest).exists());
}

#[tokio::test]
async fn test_commands_need_a_folder() {
    let temp = TempDir::new().unwrap();
    let ctx = context_for(&temp.path().join("absent"), CatalogOptions::default());

    assert!(sw(&ctx, &["rbay"]).await.is_err());
    assert!(sw(&ctx, &["config"]).await.is_ok());
}
