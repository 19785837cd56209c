use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mention_storage::{load_catalog_fixture, MemoryStore, PgStore};
use mention_sync::{pipeline_from_env, pipeline_with_store, ExtractionConfig, MentionPipeline};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "mention-cli")]
#[command(about = "Brand/university mention extraction for AI responses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print matches for a text without storing them.
    Scan {
        #[command(flatten)]
        input: TextInput,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Scan a text and upsert its mentions under an execution id.
    Extract {
        #[arg(long)]
        execution_id: Uuid,
        #[command(flatten)]
        input: TextInput,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Re-run extraction over stored responses, optionally for one topic.
    Reprocess {
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Apply database migrations.
    Migrate,
    /// Run the JSON HTTP server.
    Serve {
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct TextInput {
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
}

impl TextInput {
    async fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display())),
            (None, None) => bail!("one of --text or --file is required"),
        }
    }
}

async fn build_pipeline(fixture: Option<PathBuf>) -> Result<MentionPipeline> {
    match fixture {
        Some(path) => {
            let settings = ExtractionConfig::from_env().matcher_settings()?;
            let store = Arc::new(MemoryStore::from_fixture(load_catalog_fixture(&path).await?));
            Ok(pipeline_with_store(store, settings))
        }
        None => pipeline_from_env().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { input, fixture } => {
            let text = input.read().await?;
            let pipeline = build_pipeline(fixture).await?;
            let matches = pipeline.scan(&text).await;
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Extract {
            execution_id,
            input,
            fixture,
        } => {
            let text = input.read().await?;
            let pipeline = build_pipeline(fixture).await?;
            let outcome = pipeline.extract_and_store(execution_id, &text).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Reprocess { topic, fixture } => {
            let pipeline = build_pipeline(fixture).await?;
            let summary = pipeline.reprocess_all(topic.as_deref()).await?;
            println!(
                "reprocess complete: run_id={} processed={} brand_mentions={} university_mentions={}",
                summary.run_id, summary.processed, summary.brand_mentions, summary.university_mentions
            );
            if let Some(err) = summary.error {
                bail!("fetching stored responses failed: {err}");
            }
        }
        Commands::Migrate => {
            let config = ExtractionConfig::from_env();
            let url = config.database_url.context("DATABASE_URL must be set")?;
            let store = PgStore::connect(&url).await?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
        Commands::Serve { fixture } => {
            let bind_addr = ExtractionConfig::from_env().bind_addr;
            let pipeline = build_pipeline(fixture).await?;
            mention_web::serve(mention_web::AppState::new(Arc::new(pipeline)), &bind_addr).await?;
        }
    }

    Ok(())
}
