//! Command-line interface for sourcewrangler.
//!
//! Subcommands live in [`commands`] and are collected by a
//! [`CommandRegistry`]; each runs against a [`Context`] holding the resolved
//! configuration and the retrieval protocols.

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use crate::config::{self, ResolvedConfig};
use crate::folder::SourceFolder;
use crate::manifest::Catalog;
use crate::retriever::RetrieverRegistry;

pub mod commands;
pub mod registry;

pub use registry::{Command, CommandRegistry, RegistryError, FOLDER_ARG};

/// What every command runs against
pub struct Context {
    config: ResolvedConfig,
    retrievers: RetrieverRegistry,
}

impl Context {
    pub fn new(config: ResolvedConfig, retrievers: RetrieverRegistry) -> Self {
        Self { config, retrievers }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn retrievers(&self) -> &RetrieverRegistry {
        &self.retrievers
    }

    /// Open the configured source folder
    pub fn folder(&self) -> Result<SourceFolder> {
        SourceFolder::open(&self.config.folder).with_context(|| {
            format!(
                "No source folder at {} (run 'sw init' to create one)",
                self.config.folder.display()
            )
        })
    }

    /// Open `folder`'s manifest with the configured catalog options
    pub fn open_manifest(&self, folder: &SourceFolder) -> Result<Catalog> {
        folder
            .open_manifest_with(self.config.catalog)
            .with_context(|| format!("Failed to open manifest in {}", folder.root().display()))
    }
}

/// Parse the process arguments and run the selected command
pub async fn run() -> Result<()> {
    let commands = CommandRegistry::with_builtin()?;
    let matches = commands.build_cli().get_matches();

    let mut config = config::config()?.clone();
    if let Some(folder) = matches.get_one::<PathBuf>(FOLDER_ARG) {
        config = config.with_folder(folder.clone());
    }

    let ctx = Context::new(config, RetrieverRegistry::with_builtin()?);
    commands.dispatch(&ctx, &matches).await
}
