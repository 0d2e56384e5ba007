use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use narrascope_ai::{Classifier, Graph};
use narrascope_core::{ClassifierConfig, Taxonomy};
use narrascope_llm::ChatClient;
use narrascope_store::FileSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod documents;

#[derive(Parser, Debug)]
#[command(name = "narrascope")]
#[command(about = "Hierarchical narrative classification with LLM agents")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every *.txt file in a directory.
    Classify {
        /// Run configuration (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Taxonomy JSON: {category: {narrative: [subnarrative, ...]}}
        #[arg(short, long)]
        taxonomy: PathBuf,

        /// Label definitions JSON
        #[arg(short, long)]
        definitions: Option<PathBuf>,

        #[arg(short, long)]
        input_dir: PathBuf,

        #[arg(short, long)]
        output_dir: PathBuf,

        /// Override the configured number of documents in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the configured default model
        #[arg(long)]
        model: Option<String>,
    },
    /// Print the graph a configuration produces.
    Graph {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Summarise a taxonomy file.
    Taxonomy {
        #[arg(short, long)]
        taxonomy: PathBuf,

        #[arg(short, long)]
        definitions: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Classify {
            config,
            taxonomy,
            definitions,
            input_dir,
            output_dir,
            concurrency,
            model,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            let taxonomy = load_taxonomy(&taxonomy, definitions.as_deref())?;
            classify(config, taxonomy, &input_dir, &output_dir).await
        }
        Command::Graph { config } => {
            let config = load_config(config.as_deref())?;
            let graph = Graph::build(&config).context("building graph")?;
            print!("{}", graph.describe());
            Ok(())
        }
        Command::Taxonomy {
            taxonomy,
            definitions,
        } => {
            let taxonomy = load_taxonomy(&taxonomy, definitions.as_deref())?;
            let summary = taxonomy.summary();
            println!("categories:       {}", summary.categories);
            println!("narratives:       {}", summary.narratives);
            println!("subnarratives:    {}", summary.subnarratives);
            println!("with definitions: {}", summary.with_definitions);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ClassifierConfig> {
    match path {
        Some(path) => ClassifierConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ClassifierConfig::default()),
    }
}

fn load_taxonomy(path: &Path, definitions: Option<&Path>) -> Result<Taxonomy> {
    let taxonomy = Taxonomy::load(path)?;
    match definitions {
        Some(defs) => Ok(taxonomy.load_definitions(defs)?),
        None => Ok(taxonomy),
    }
}

async fn classify(
    config: ClassifierConfig,
    taxonomy: Taxonomy,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<()> {
    let docs = documents::load_dir(input_dir)?;
    if docs.is_empty() {
        anyhow::bail!("no .txt documents in {}", input_dir.display());
    }

    let api_key = match &config.llm.api_key_env {
        Some(var) => Some(
            std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?,
        ),
        None => None,
    };
    let llm = ChatClient::new(
        config.llm.provider.clone(),
        &config.llm.base_url,
        api_key,
        config.llm.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )
    .context("creating LLM client")?;
    let sink = FileSink::create(output_dir)
        .await
        .with_context(|| format!("preparing {}", output_dir.display()))?;

    let classifier = Classifier::new(config, Arc::new(taxonomy), Arc::new(llm), Arc::new(sink))?;
    info!(documents = docs.len(), "classifying");
    let summary = classifier.run_batch(docs).await;

    println!(
        "Classified {}/{} documents ({} failed)",
        summary.succeeded, summary.total, summary.failed
    );
    for (file_id, error) in &summary.failures {
        println!("  {file_id}: {error}");
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} documents failed", summary.failed, summary.total);
    }
    Ok(())
}
