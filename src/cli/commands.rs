//! Built-in `sw` commands.

use std::fs;
use std::path::PathBuf;
use std::process::Command as Process;

use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use clap::{ArgMatches, Args, FromArgMatches};
use serde_json::{json, Value};

use super::registry::Command;
use super::Context;
use crate::error::SourceError;
use crate::folder::{SourceFolder, TemporaryFile};
use crate::manifest::{fields, Catalog, Record, Records};
use crate::retriever::{compute_file_hash, Retrieval};

/// Commit unless the catalog already did
fn persist(catalog: &Catalog) -> Result<()> {
    if !catalog.options().autocommit {
        catalog.commit().context("Failed to save manifest")?;
    }
    Ok(())
}

/// A JSON value as a user would type it
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn title_of(record: &Record) -> String {
    record
        .get(fields::TITLE)
        .map(display_value)
        .unwrap_or_else(|| "(untitled)".to_string())
}

// ============================================================================
// init
// ============================================================================

pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    fn name(&self) -> &'static str {
        "init"
    }

    fn about(&self) -> &'static str {
        "Create a source folder, or complete a partial one"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    async fn run(&self, ctx: &Context, _args: &ArgMatches) -> Result<()> {
        let folder = SourceFolder::spawn(&ctx.config().folder)
            .with_context(|| format!("Failed to create source folder at {}", ctx.config().folder.display()))?;
        println!("Source folder ready at {}", folder.root().display());
        Ok(())
    }
}

// ============================================================================
// open
// ============================================================================

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// The ID of the source to open
    pub key: usize,

    #[command(flatten)]
    pub medium: Medium,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Medium {
    /// Open the version of the file stored on disk
    #[arg(short = 'l')]
    pub local: bool,

    /// Open the file in your web browser
    #[arg(short = 'w')]
    pub web: bool,
}

pub struct OpenCommand;

#[async_trait]
impl Command for OpenCommand {
    fn name(&self) -> &'static str {
        "open"
    }

    fn about(&self) -> &'static str {
        "View a source file, stored locally or on the web"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        OpenArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = OpenArgs::from_arg_matches(args)?;
        let folder = ctx.folder()?;

        let target = if args.medium.local {
            folder.source_path(args.key)?.display().to_string()
        } else {
            let catalog = ctx.open_manifest(&folder)?;
            let record = catalog.get(args.key)?;
            record
                .get(fields::HUMAN)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("No URL defined for this source"))?
        };

        open_target(&target)
    }
}

/// Platform opener and the arguments it needs before the target
fn opener() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(windows) {
        ("cmd", &["/C", "start", ""])
    } else {
        ("xdg-open", &[])
    }
}

fn open_target(target: &str) -> Result<()> {
    let (program, leading) = opener();
    let result = Process::new(program).args(leading).arg(target).status();

    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => {
            println!("{} failed. You can manually open:", program);
            println!("  {}", target);
            Ok(())
        }
        Err(e) => {
            println!("Could not run {} ({}). You can manually open:", program, e);
            println!("  {}", target);
            Ok(())
        }
    }
}

// ============================================================================
// values
// ============================================================================

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ValuesArgs {
    /// Print all unique authors
    #[arg(short = 'a')]
    pub author: bool,

    /// Print all unique categories
    #[arg(short = 'c')]
    pub category: bool,

    /// Print all unique media types
    #[arg(short = 'm')]
    pub media: bool,

    /// Print all unique titles
    #[arg(short = 't')]
    pub title: bool,

    /// Print all unique values of any field
    #[arg(short = 'f', long = "field", value_name = "FIELD")]
    pub field: Option<String>,
}

impl ValuesArgs {
    pub fn selected_field(&self) -> &str {
        if self.author {
            fields::AUTHOR
        } else if self.category {
            fields::CATEGORY
        } else if self.media {
            fields::MEDIA
        } else if self.title {
            fields::TITLE
        } else {
            self.field.as_deref().unwrap_or(fields::TITLE)
        }
    }
}

pub struct ValuesCommand;

#[async_trait]
impl Command for ValuesCommand {
    fn name(&self) -> &'static str {
        "values"
    }

    fn about(&self) -> &'static str {
        "Print the distinct values of a field"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        ValuesArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = ValuesArgs::from_arg_matches(args)?;
        let field = args.selected_field();

        let folder = ctx.folder()?;
        let catalog = ctx.open_manifest(&folder)?;

        let mut values: Vec<String> = catalog.values(field)?.iter().map(display_value).collect();
        values.sort();

        println!("Found the following values for '{}':", field);
        for value in values {
            println!("{}", value);
        }
        Ok(())
    }
}

// ============================================================================
// search
// ============================================================================

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Field to search
    pub field: String,

    /// Value to look for
    pub query: String,

    /// Treat the query as a regular expression matched anywhere in the value
    #[arg(short, long)]
    pub regex: bool,
}

pub struct SearchCommand;

#[async_trait]
impl Command for SearchCommand {
    fn name(&self) -> &'static str {
        "search"
    }

    fn about(&self) -> &'static str {
        "Find sources by field value"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        SearchArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = SearchArgs::from_arg_matches(args)?;
        let folder = ctx.folder()?;
        let catalog = ctx.open_manifest(&folder)?;

        let ids = catalog.search(&args.field, &args.query, args.regex)?;
        if ids.is_empty() {
            println!("No results found for: {}", args.query);
            return Ok(());
        }

        println!("{:<6} {}", "ID", "TITLE");
        println!("{}", "-".repeat(60));
        for id in ids {
            println!("{:<6} {}", id, title_of(catalog.get(id)?));
        }
        Ok(())
    }
}

// ============================================================================
// show
// ============================================================================

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// The ID of the source to show
    pub key: usize,
}

pub struct ShowCommand;

#[async_trait]
impl Command for ShowCommand {
    fn name(&self) -> &'static str {
        "show"
    }

    fn about(&self) -> &'static str {
        "Print a source's record"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        ShowArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = ShowArgs::from_arg_matches(args)?;
        let folder = ctx.folder()?;
        let catalog = ctx.open_manifest(&folder)?;

        println!("{}", serde_json::to_string_pretty(catalog.get(args.key)?)?);

        match folder.get(args.key) {
            Ok(name) => println!("File: {}", name),
            Err(SourceError::NotFound(_)) => println!("File: (not in receiving bay)"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

// ============================================================================
// add
// ============================================================================

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(short = 'a', long)]
    pub author: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    /// Medium, e.g. paper or book
    #[arg(short = 'm', long)]
    pub media: Option<String>,

    #[arg(short = 't', long)]
    pub title: Option<String>,

    /// Web page for the source
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// How to fetch the source, as JSON: {"protocol": ..., "options": {...}}
    #[arg(long, value_name = "JSON")]
    pub retrieval: Option<String>,
}

impl AddArgs {
    /// Build the record, checking the retrieval against `ctx`'s protocols
    pub fn to_record(&self, ctx: &Context) -> Result<Record> {
        let mut record = Record::new();

        let text_fields = [
            (fields::AUTHOR, &self.author),
            (fields::CATEGORY, &self.category),
            (fields::MEDIA, &self.media),
            (fields::TITLE, &self.title),
            (fields::HUMAN, &self.url),
        ];
        for (name, value) in text_fields {
            if let Some(value) = value {
                record.insert(name.to_string(), json!(value));
            }
        }

        if let Some(raw) = &self.retrieval {
            let value: Value = serde_json::from_str(raw).context("--retrieval is not valid JSON")?;
            let mut probe = Record::new();
            probe.insert(fields::RETRIEVAL.to_string(), value.clone());

            if let Some(retrieval) = Retrieval::from_record(&probe)? {
                if !ctx.retrievers().validate(&retrieval.protocol, &retrieval.options)? {
                    bail!("Retrieval options rejected by protocol '{}'", retrieval.protocol);
                }
            }
            record.insert(fields::RETRIEVAL.to_string(), value);
        }

        if record.is_empty() {
            bail!("Nothing to add: give at least one field");
        }
        Ok(record)
    }
}

pub struct AddCommand;

#[async_trait]
impl Command for AddCommand {
    fn name(&self) -> &'static str {
        "add"
    }

    fn about(&self) -> &'static str {
        "Append a source to the manifest and print its ID"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        AddArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = AddArgs::from_arg_matches(args)?;
        let record = args.to_record(ctx)?;

        let folder = ctx.folder()?;
        let mut catalog = ctx.open_manifest(&folder)?;
        let id = catalog.add(record)?;
        persist(&catalog)?;

        println!("{}", id);
        Ok(())
    }
}

// ============================================================================
// rbay
// ============================================================================

pub struct RbayCommand;

#[async_trait]
impl Command for RbayCommand {
    fn name(&self) -> &'static str {
        "rbay"
    }

    fn about(&self) -> &'static str {
        "List files in the receiving bay"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    async fn run(&self, ctx: &Context, _args: &ArgMatches) -> Result<()> {
        let folder = ctx.folder()?;
        let mut names = folder.receiving_bay().available()?;
        names.sort();

        if names.is_empty() {
            println!("Receiving bay is empty");
        }
        for name in names {
            println!("{}", name);
        }
        Ok(())
    }
}

// ============================================================================
// fetch
// ============================================================================

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// The ID of the source to fetch
    pub key: usize,
}

pub struct FetchCommand;

#[async_trait]
impl Command for FetchCommand {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn about(&self) -> &'static str {
        "Retrieve a source into the receiving bay"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        FetchArgs::augment_args(cmd)
    }

    async fn run(&self, ctx: &Context, args: &ArgMatches) -> Result<()> {
        let args = FetchArgs::from_arg_matches(args)?;
        let key = args.key;

        let folder = ctx.folder()?;
        let mut catalog = ctx.open_manifest(&folder)?;
        let mut record = catalog.get(key)?.clone();

        let retrieval = Retrieval::from_record(&record)?
            .ok_or_else(|| anyhow!("No retrieval defined for source {}", key))?;

        let retrieved = ctx
            .retrievers()
            .retrieve(&retrieval, folder.temporary_area())
            .await
            .with_context(|| format!("Failed to retrieve source {}", key))?;

        let digest = match compute_file_hash(retrieved.file.path()).await {
            Ok(digest) => digest,
            Err(e) => {
                discard(&retrieved.file);
                return Err(e).context("Failed to hash retrieved file");
            }
        };

        record.insert(fields::SHA256.to_string(), json!(digest));
        record.insert(fields::MEDIA_TYPE.to_string(), json!(retrieved.media_type));

        let target = store_fetched(&folder, &mut catalog, key, record, &retrieved.file)?;

        println!("Fetched source {} into {}", key, target.display());
        Ok(())
    }
}

fn discard(file: &TemporaryFile) {
    if let Err(e) = file.cleanup() {
        tracing::warn!(path = %file.path().display(), error = %e, "Failed to remove temporary file");
    }
}

/// Move a fetched file into the receiving bay and record it under `key`.
///
/// Either both happen or neither: the temporary file is discarded on every
/// failure, and the receiving-bay copy is removed again if the manifest
/// cannot be updated.
fn store_fetched(
    folder: &SourceFolder,
    catalog: &mut Catalog,
    key: usize,
    record: Record,
    file: &TemporaryFile,
) -> Result<PathBuf> {
    let name = match file.suffix() {
        "" => format!("{}-source", key),
        suffix => format!("{}-{}", key, suffix),
    };

    let target = match folder.receiving_bay().accept(file, &name) {
        Ok(target) => target,
        Err(e) => {
            discard(file);
            return Err(e).with_context(|| format!("Could not store {} in the receiving bay", name));
        }
    };

    let updated = match catalog.replace(key, record) {
        Ok(()) => persist(catalog),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = updated {
        if let Err(remove) = fs::remove_file(&target) {
            tracing::warn!(path = %target.display(), error = %remove, "Failed to remove fetched file");
        }
        return Err(e).with_context(|| format!("Failed to record fetched file for source {}", key));
    }

    Ok(target)
}

// ============================================================================
// config
// ============================================================================

pub struct ConfigCommand;

#[async_trait]
impl Command for ConfigCommand {
    fn name(&self) -> &'static str {
        "config"
    }

    fn about(&self) -> &'static str {
        "Show resolved configuration"
    }

    fn specify_args(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    async fn run(&self, ctx: &Context, _args: &ArgMatches) -> Result<()> {
        print!("{}", serde_yaml::to_string(ctx.config())?);

        let protocols: Vec<&str> = ctx.retrievers().protocols().collect();
        println!("protocols: [{}]", protocols.join(", "));

        let state = if SourceFolder::check(&ctx.config().folder) {
            "ready"
        } else {
            "missing (run 'sw init')"
        };
        println!("folder_state: {}", state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetched_file(folder: &SourceFolder, name: &str) -> TemporaryFile {
        let file = folder.temporary_area().allocate(name).unwrap();
        fs::write(file.path(), b"%PDF").unwrap();
        file
    }

    #[test]
    fn test_store_fetched_refused_name_discards_temporary_file() {
        let temp = TempDir::new().unwrap();
        let folder = SourceFolder::spawn(temp.path()).unwrap();
        let mut catalog = folder.open_manifest().unwrap();
        catalog.add(Record::new()).unwrap();
        fs::write(folder.receiving_bay().path().join("0-a.pdf"), b"first").unwrap();

        let file = fetched_file(&folder, "a.pdf");
        let result = store_fetched(&folder, &mut catalog, 0, Record::new(), &file);

        assert!(result.is_err());
        assert!(folder.temporary_area().available().unwrap().is_empty());
        assert_eq!(fs::read(folder.receiving_bay().path().join("0-a.pdf")).unwrap(), b"first");
    }

    #[test]
    fn test_store_fetched_rolls_back_when_manifest_cannot_be_written() {
        let temp = TempDir::new().unwrap();
        let folder = SourceFolder::spawn(temp.path()).unwrap();
        let mut catalog = folder.open_manifest().unwrap();
        catalog.add(Record::new()).unwrap();

        // Nothing can be renamed over a non-empty directory
        fs::remove_file(folder.manifest_path()).unwrap();
        fs::create_dir_all(folder.manifest_path().join("blocker")).unwrap();

        let file = fetched_file(&folder, "a.pdf");
        let mut record = Record::new();
        record.insert(fields::SHA256.to_string(), json!("00"));
        let result = store_fetched(&folder, &mut catalog, 0, record, &file);

        assert!(result.is_err());
        assert!(folder.receiving_bay().available().unwrap().is_empty());
        assert!(folder.temporary_area().available().unwrap().is_empty());
    }

    fn parse_values(args: &[&str]) -> ValuesArgs {
        let cmd = ValuesArgs::augment_args(clap::Command::new("values"));
        let matches = cmd.try_get_matches_from(args).unwrap();
        ValuesArgs::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn test_values_field_selection() {
        assert_eq!(parse_values(&["values", "-a"]).selected_field(), "author");
        assert_eq!(parse_values(&["values", "-c"]).selected_field(), "category");
        assert_eq!(parse_values(&["values", "-m"]).selected_field(), "media");
        assert_eq!(parse_values(&["values", "-t"]).selected_field(), "title");
        assert_eq!(parse_values(&["values", "-f", "year"]).selected_field(), "year");
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("Knuth")), "Knuth");
        assert_eq!(display_value(&json!(1968)), "1968");
        assert_eq!(display_value(&json!(["a"])), r#"["a"]"#);
    }

    #[test]
    fn test_title_of() {
        let mut record = Record::new();
        assert_eq!(title_of(&record), "(untitled)");
        record.insert("title".to_string(), json!("TAOCP"));
        assert_eq!(title_of(&record), "TAOCP");
    }
}
