//! Table of `sw` subcommands.
//!
//! Each subcommand is a [`Command`]: it adds its arguments to a clap command
//! and runs against a [`Context`] with the parsed matches. The registry owns
//! the commands, builds the top-level parser from them and dispatches.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use clap::{value_parser, Arg, ArgMatches};
use thiserror::Error;

use super::commands;
use super::Context;
use crate::config::ENV_FOLDER;

/// Id of the global `--folder` argument
pub const FOLDER_ARG: &str = "folder";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("Unknown command '{0}'")]
    InvalidCommand(String),
}

/// One `sw` subcommand
#[async_trait]
pub trait Command: Send + Sync {
    /// Name typed on the command line
    fn name(&self) -> &'static str;

    /// One-line help
    fn about(&self) -> &'static str;

    /// Add this command's arguments to `cmd`
    fn specify_args(&self, cmd: clap::Command) -> clap::Command;

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()>;
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in command
    pub fn with_builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Box::new(commands::InitCommand))?;
        registry.register(Box::new(commands::OpenCommand))?;
        registry.register(Box::new(commands::ValuesCommand))?;
        registry.register(Box::new(commands::SearchCommand))?;
        registry.register(Box::new(commands::ShowCommand))?;
        registry.register(Box::new(commands::AddCommand))?;
        registry.register(Box::new(commands::RbayCommand))?;
        registry.register(Box::new(commands::FetchCommand))?;
        registry.register(Box::new(commands::ConfigCommand))?;
        Ok(registry)
    }

    pub fn register(&mut self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        let name = command.name();
        if self.commands.contains_key(name) {
            return Err(RegistryError::DuplicateCommand(name.to_string()));
        }
        self.commands.insert(name, command);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&dyn Command, RegistryError> {
        self.commands
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| RegistryError::InvalidCommand(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    /// The `sw` parser with one subcommand per registered command
    pub fn build_cli(&self) -> clap::Command {
        let mut cli = clap::Command::new("sw")
            .about("Manage a folder of reference sources and their manifest")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new(FOLDER_ARG)
                    .long("folder")
                    .value_name("DIR")
                    .value_parser(value_parser!(PathBuf))
                    .env(ENV_FOLDER)
                    .global(true)
                    .help("Source folder to use (overrides config files)"),
            );

        for command in self.commands.values() {
            let sub = clap::Command::new(command.name()).about(command.about());
            cli = cli.subcommand(command.specify_args(sub));
        }

        cli
    }

    /// Run the subcommand selected in `matches`
    pub async fn dispatch(&self, ctx: &Context, matches: &ArgMatches) -> Result<()> {
        let (name, args) = matches
            .subcommand()
            .ok_or_else(|| anyhow::anyhow!("No command given"))?;
        tracing::debug!(command = name, "Dispatching");
        self.get(name)?.run(ctx, args).await
    }
}
