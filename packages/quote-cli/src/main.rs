//! Command-line driver for the quote extraction pipeline.
//!
//! Reads quote documents from disk, extracts them into a SQLite database and
//! prints JSON (or a comparison table for `report`) to stdout. Logs go to
//! stderr.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quote_extraction::{
    apply_edit, apply_suggestion, CorrectionField, Document, OptimizationSuggestion,
    PageSpec, Pipeline, PipelineConfig, ProfileSelection, ProfileStore, ProviderConfig,
    QuoteComparison, QuoteStore, SourceProfile, SqliteStore, UploadedFile,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "quote")]
#[command(about = "Extract and compare insurance quotes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files into a quote
    Extract {
        /// Batch the files belong to; omit for one quote per file
        #[arg(long)]
        batch: Option<String>,

        /// Profile to use instead of matching by file name
        #[arg(long, conflicts_with = "no_profile")]
        profile: Option<Uuid>,

        /// Extract without any profile
        #[arg(long)]
        no_profile: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage source profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Correct a line item field
    Correct {
        item_id: Uuid,
        field: CorrectionField,
        value: String,

        /// Do not record a correction rule
        #[arg(long)]
        no_learn: bool,
    },

    /// Set a profile's page spec, as proposed after a batch
    ApplySuggestion { profile_id: Uuid, page_spec: String },

    /// Compare the offers of a quote
    Report {
        quote_id: Uuid,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create a profile
    Add {
        name: String,

        /// Pages to send, e.g. "2", "1,3-4" or "0" for the whole document
        #[arg(long, default_value = "2")]
        pages: String,

        #[arg(long, default_value = "")]
        instructions: String,
    },

    /// List profiles
    List,
}

#[derive(Serialize)]
struct EditResponse {
    item: quote_extraction::QuoteLineItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    learned_rule: Option<quote_extraction::CorrectionRule>,
}

fn output(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quote_extraction=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = SqliteStore::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    tracing::debug!(database = %config.database_url, owner_id = %config.owner_id, "Opened quote database");

    match cli.command {
        Commands::Extract {
            batch,
            profile,
            no_profile,
            files,
        } => {
            let selection = match (profile, no_profile) {
                (Some(id), _) => ProfileSelection::Explicit(id),
                (None, true) => ProfileSelection::None,
                (None, false) => ProfileSelection::MatchByName,
            };
            cmd_extract(&config, store, batch.as_deref(), selection, &files).await
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Add {
                name,
                pages,
                instructions,
            } => cmd_profile_add(&config, &store, &name, &pages, &instructions).await,
            ProfileCommands::List => output(&store.list_profiles(config.owner_id).await?),
        },
        Commands::Correct {
            item_id,
            field,
            value,
            no_learn,
        } => {
            let outcome =
                apply_edit(&store, config.owner_id, item_id, field, &value, !no_learn).await?;
            output(&EditResponse {
                item: outcome.item,
                learned_rule: outcome.rule,
            })
        }
        Commands::ApplySuggestion {
            profile_id,
            page_spec,
        } => cmd_apply_suggestion(&store, profile_id, &page_spec).await,
        Commands::Report { quote_id, json } => {
            let quote = store
                .get_quote(quote_id)
                .await?
                .with_context(|| format!("Quote {quote_id} not found"))?;
            let comparison = QuoteComparison::new(&quote);
            if json {
                output(&comparison)
            } else {
                print!("{comparison}");
                Ok(())
            }
        }
    }
}

async fn read_upload(path: &Path, profile: ProfileSelection) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;

    Ok(UploadedFile::new(Document::new(file_name, bytes))
        .with_file_path(path.to_string_lossy())
        .with_profile(profile))
}

async fn cmd_extract(
    config: &Config,
    store: SqliteStore,
    batch: Option<&str>,
    profile: ProfileSelection,
    paths: &[PathBuf],
) -> Result<()> {
    let provider = ProviderConfig::from_env()
        .context("Extraction provider is not configured")?
        .build();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_upload(path, profile).await?);
    }

    let pipeline = Pipeline::with_config(
        store,
        provider,
        PipelineConfig::default().with_concurrency(config.concurrency),
    );
    let report = pipeline.process_batch(config.owner_id, batch, &files).await;
    output(&report)?;

    if report.failed_count() == files.len() {
        bail!("All {} file(s) failed", files.len());
    }
    Ok(())
}

async fn cmd_profile_add(
    config: &Config,
    store: &SqliteStore,
    name: &str,
    pages: &str,
    instructions: &str,
) -> Result<()> {
    let canonical = PageSpec::parse(pages);
    let profile = SourceProfile::new(config.owner_id, name)
        .with_page_spec(canonical.to_string())
        .with_instructions(instructions);
    store.upsert_profile(&profile).await?;
    output(&profile)
}

async fn cmd_apply_suggestion(store: &SqliteStore, profile_id: Uuid, page_spec: &str) -> Result<()> {
    let profile = store
        .get_profile(profile_id)
        .await?
        .with_context(|| format!("Profile {profile_id} not found"))?;

    let suggestion = OptimizationSuggestion {
        profile_id,
        profile_name: profile.name,
        current_spec: profile.page_spec,
        suggested_spec: PageSpec::parse(page_spec).to_string(),
        rationale: "applied from the command line".to_string(),
    };
    apply_suggestion(store, &suggestion).await?;
    output(&suggestion)
}
