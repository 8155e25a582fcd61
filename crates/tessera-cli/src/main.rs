//! Tessera command line tools.
//!
//! Usage:
//!   # Lint a block schema
//!   tessera check schema.json
//!
//!   # Expand stored rich text, resolving links against a content database
//!   tessera expand body.html --config tessera.toml
//!
//!   # What uses page 3?
//!   tessera usages --config tessera.toml core.page 3 --page 2
//!
//!   # Rebuild the action log from saved revisions
//!   tessera backfill-logs --config tessera.toml

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use tessera_blocks::BlockSpec;
use tessera_kernel::{
    ContentStore, DbVendor, LogActionRegistry, SqliteLogEntries, SqliteStore, TesseraConfig,
    create_log_entries_from_revisions, get_paginated_uses, register_core_actions,
};
use tessera_richtext::{FeatureRegistry, register_core_features};
use tessera_types::{ModelLabel, ObjectLookup, ObjectRef, ObjectSummary, Pk};

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Block schemas, rich text and usage reports", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a JSON block schema for invalid block names
    Check {
        schema: PathBuf,

        /// Also print the schema's editor definition
        #[arg(long)]
        definition: bool,
    },

    /// Expand stored rich text to front-end HTML
    Expand {
        file: PathBuf,

        /// Resolve links and embeds against this configuration's database
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the objects that use an object
    Usages {
        #[arg(long)]
        config: PathBuf,

        /// Model label, e.g. core.page
        model: String,

        pk: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Print HTML rows instead of plain text
        #[arg(long)]
        html: bool,
    },

    /// Write log entries for saved revisions that have none
    BackfillLogs {
        #[arg(long)]
        config: PathBuf,
    },
}

/// Lookup for rich text expanded without a database.
struct NoObjects;

impl ObjectLookup for NoObjects {
    fn lookup(&self, _model: &ModelLabel, _pk: &Pk) -> Option<ObjectSummary> {
        None
    }
}

fn open_store(config: &TesseraConfig) -> Result<SqliteStore> {
    let registry = config
        .build_registry()
        .context("invalid model declarations")?;
    if config.database.vendor != DbVendor::Sqlite {
        warn!(
            vendor = %config.database.vendor,
            "only sqlite databases can be opened; using the sqlite regex dialect"
        );
    }
    match &config.database.path {
        Some(path) => SqliteStore::open(path, registry)
            .with_context(|| format!("opening {}", path.display())),
        None => {
            warn!("no database path configured, using an empty in-memory store");
            Ok(SqliteStore::in_memory(registry)?)
        }
    }
}

fn load_config(path: &Path) -> Result<TesseraConfig> {
    TesseraConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

/// Returns false if the schema has problems.
fn check(schema: &Path, definition: bool, out: &mut impl Write) -> Result<bool> {
    let json = std::fs::read_to_string(schema)
        .with_context(|| format!("reading {}", schema.display()))?;
    let block = BlockSpec::from_json(&json)?.build()?;
    let messages = block.check();
    for message in &messages {
        writeln!(out, "{message}")?;
    }
    if definition {
        writeln!(out, "{}", serde_json::to_string_pretty(&block.get_definition())?)?;
    }
    info!(problems = messages.len(), "checked {}", schema.display());
    Ok(messages.is_empty())
}

fn expand(file: &Path, config: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let lookup: Arc<dyn ObjectLookup> = match config {
        Some(path) => Arc::new(open_store(&load_config(path)?)?),
        None => Arc::new(NoObjects),
    };
    let features = FeatureRegistry::new();
    register_core_features(&features, lookup);
    writeln!(out, "{}", features.expand_db_html(&html))?;
    Ok(())
}

fn usages(
    config: &Path,
    model: &str,
    pk: &str,
    page: usize,
    html: bool,
    out: &mut impl Write,
) -> Result<()> {
    let config = load_config(config)?;
    let model = ModelLabel::parse(model)?;
    let store = Arc::new(open_store(&config)?);
    let features = FeatureRegistry::new();
    register_core_features(&features, Arc::clone(&store) as Arc<dyn ObjectLookup>);
    let finders = config.admin_url_finders();

    let root = ObjectRef::new(model, Pk::from_attr(pk));
    let report = get_paginated_uses(
        store.as_ref(),
        &features,
        &finders,
        std::slice::from_ref(&root),
        page,
        config.pagination.per_page,
    )?;

    if report.are_protected {
        writeln!(out, "{root} cannot be deleted: it is protected by other objects")?;
    }
    for u in &report.uses {
        if html {
            writeln!(out, "{} {}", u.html(), u.on_delete_html())?;
        } else {
            let (_, message) = u.on_delete_data();
            let indent = "  ".repeat(u.depth);
            writeln!(out, "{indent}{} ({}): {message}", u.title, u.model_name)?;
        }
    }
    writeln!(
        out,
        "{} uses, page {} of {}",
        report.count, report.number, report.num_pages
    )?;
    Ok(())
}

fn backfill_logs(config: &Path, out: &mut impl Write) -> Result<()> {
    let config = load_config(config)?;
    let store = Arc::new(open_store(&config)?);
    let registry = LogActionRegistry::new();
    registry.add_hook(register_core_actions);
    // one log per model family, named after its root model
    for model in store.registry().models().filter(|m| m.parent.is_none()) {
        registry.register_model(
            model.label.clone(),
            Arc::new(SqliteLogEntries::new(Arc::clone(&store), model.label.to_string())),
        );
    }

    let report = create_log_entries_from_revisions(&store, &registry)?;
    for model in &report.skipped_models {
        writeln!(out, "skipped revisions of {model}")?;
    }
    writeln!(
        out,
        "{} log entries written for {} revisions",
        report.entries, report.revisions
    )?;
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::Check { schema, definition } => {
            let clean = check(&schema, definition, &mut stdout)?;
            Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Expand { file, config } => {
            expand(&file, config.as_deref(), &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Usages {
            config,
            model,
            pk,
            page,
            html,
        } => {
            usages(&config, &model, &pk, page, html, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::BackfillLogs { config } => {
            backfill_logs(&config, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
