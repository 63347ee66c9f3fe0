//! techdoc: hybrid retrieval over technical documentation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use techdoc::{
    config::{Config, LogFormat},
    embedding::{create_embedder, Embedder},
    index::{HybridIndex, IndexSettings},
    retrieval::{
        assemble_context, reorder_long_context, HybridIndexer, HybridRetriever, SimpleReranker,
    },
    types::{Document, ScoredPassage},
    util::truncate_str,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// File extensions picked up when ingesting a directory
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "text"];

#[derive(Parser)]
#[command(name = "techdoc")]
#[command(about = "Hybrid dense + BM25 retrieval over technical documentation")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "techdoc.toml")]
    config: PathBuf,

    /// Index snapshot file
    #[arg(short, long, default_value = "techdoc-index.json")]
    snapshot: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or directories
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Domain tag for every ingested document (detected when omitted)
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Search the index
    Search {
        /// Search query
        query: String,

        /// Restrict results to one domain
        #[arg(short, long)]
        domain: Option<String>,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Deadline for the whole query in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Rerank results by query term overlap
        #[arg(long)]
        rerank: bool,

        /// Print the assembled generator context instead of a result list
        #[arg(long)]
        context: bool,

        /// Token budget for --context
        #[arg(long, default_value = "2000")]
        max_tokens: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a document and all its passages
    Delete {
        /// Document id (the path it was ingested from)
        document_id: String,
    },

    /// Check that every passage is present in both sub-indexes
    Verify,

    /// Show index statistics
    Stats,

    /// Write a configuration file with all defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Ingest { paths, domain } => {
            ingest_paths(config, &cli.snapshot, paths, domain).await
        }
        Commands::Search {
            query,
            domain,
            top_k,
            timeout_ms,
            rerank,
            context,
            max_tokens,
            format,
        } => {
            let options = SearchOptions {
                domain,
                top_k,
                timeout: timeout_ms.map(Duration::from_millis),
                rerank,
                context,
                max_tokens,
                format,
            };
            search_index(config, &cli.snapshot, query, options).await
        }
        Commands::Delete { document_id } => delete_document(config, &cli.snapshot, document_id),
        Commands::Verify => verify_index(config, &cli.snapshot),
        Commands::Stats => show_stats(config, &cli.snapshot),
        Commands::InitConfig { force } => init_config(&cli.config, force),
    }
}

fn init_logging(config: &Config, verbose: u8) {
    let level = config.logging.level.raised_by(verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Load the snapshot if present, otherwise start an empty index
fn open_index(config: &Config, snapshot: &Path) -> Result<Arc<HybridIndex>> {
    if snapshot.exists() {
        let index = HybridIndex::load(snapshot)
            .with_context(|| format!("Failed to load snapshot '{}'", snapshot.display()))?;
        if index.dimensions() != config.embedding.dimensions {
            bail!(
                "snapshot was built with {}-dimensional embeddings but the config uses {}",
                index.dimensions(),
                config.embedding.dimensions
            );
        }
        return Ok(Arc::new(index));
    }
    info!("No snapshot at {}, starting an empty index", snapshot.display());
    Ok(Arc::new(HybridIndex::new(
        config.embedding.dimensions,
        IndexSettings::from_config(config),
    )))
}

fn open_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    create_embedder(&config.embedding).context("Failed to create embedding backend")
}

fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let is_text = entry
                        .path()
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()));
                    if is_text {
                        files.push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry: {}", e),
            }
        }
    }
    files
}

async fn ingest_paths(
    config: Config,
    snapshot: &Path,
    paths: Vec<PathBuf>,
    domain: Option<String>,
) -> Result<()> {
    let index = open_index(&config, snapshot)?;
    let indexer = HybridIndexer::new(index.clone(), open_embedder(&config)?, &config)?;

    let mut documents = Vec::new();
    for file in collect_files(&paths) {
        let text = match std::fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let mut document = Document::new(
            file.display().to_string(),
            text,
            domain.clone().unwrap_or_default(),
        );
        if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
            document = document.with_title(name);
        }
        documents.push(document);
    }

    if documents.is_empty() {
        bail!("no text files found to ingest");
    }

    let report = indexer.ingest_batch(documents).await;
    index.save(snapshot)?;

    println!(
        "Ingested {} documents ({} passages), {} failed",
        report.ingested.len(),
        report.passage_count(),
        report.failed.len()
    );
    for (document_id, error) in &report.failed {
        println!("  failed: {}: {}", document_id, error);
    }
    println!("Snapshot saved to {}", snapshot.display());

    Ok(())
}

struct SearchOptions {
    domain: Option<String>,
    top_k: Option<usize>,
    timeout: Option<Duration>,
    rerank: bool,
    context: bool,
    max_tokens: usize,
    format: String,
}

async fn search_index(
    config: Config,
    snapshot: &Path,
    query: String,
    options: SearchOptions,
) -> Result<()> {
    let index = open_index(&config, snapshot)?;
    let retriever = HybridRetriever::new(index, open_embedder(&config)?, &config)?;
    let top_k = options.top_k.unwrap_or(config.retrieval.default_top_k);

    let mut results = retriever
        .retrieve(&query, options.domain.as_deref(), top_k, options.timeout)
        .await?;
    if options.rerank {
        SimpleReranker::rerank(&query, &mut results);
    }

    if options.context {
        let ordered = reorder_long_context(results);
        println!("{}", assemble_context(&ordered, options.max_tokens));
        return Ok(());
    }

    match options.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => print_results(&results),
    }

    Ok(())
}

fn print_results(results: &[ScoredPassage]) {
    println!("\nSearch Results ({} found):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let matched: Vec<String> = result.matched_by.iter().map(|m| m.to_string()).collect();
        println!(
            "{}. [Score: {:.4}] [dense {:.3} | lexical {:.3}]",
            i + 1,
            result.fused_score,
            result.dense_score,
            result.lexical_score
        );
        println!("   ID: {}", result.passage_id());
        println!("   Domain: {}", result.domain());
        println!(
            "   Content: {}",
            truncate_str(&result.passage.text.replace('\n', " "), 200)
        );
        println!("   Matched by: {}", matched.join(", "));
        println!();
    }
}

fn delete_document(config: Config, snapshot: &Path, document_id: String) -> Result<()> {
    if !snapshot.exists() {
        bail!("no snapshot at {}", snapshot.display());
    }
    let index = open_index(&config, snapshot)?;
    let removed = index.remove_document(&document_id);
    if removed == 0 {
        println!("Document {} not found", document_id);
        return Ok(());
    }
    index.save(snapshot)?;
    println!("Deleted {} ({} passages)", document_id, removed);
    Ok(())
}

fn verify_index(config: Config, snapshot: &Path) -> Result<()> {
    let index = open_index(&config, snapshot)?;
    let problems = index.verify();
    if let Some(recall) = index.recheck_recall() {
        println!("HNSW recall@10: {:.3}", recall);
    }
    if !problems.is_empty() {
        for problem in &problems {
            println!("  {}", problem);
        }
        bail!("index verification found {} problems", problems.len());
    }
    println!("Index is consistent");
    Ok(())
}

fn show_stats(config: Config, snapshot: &Path) -> Result<()> {
    let index = open_index(&config, snapshot)?;
    let stats = index.stats();

    println!("\ntechdoc Statistics:");
    println!("===================");
    println!("Snapshot: {}", snapshot.display());
    println!("Documents: {}", stats.documents);
    println!("Passages: {}", stats.passages);
    println!("Vocabulary: {} terms", stats.vocabulary);
    println!("Average passage length: {:.1} terms", stats.average_passage_length);
    println!("Embedding dimensions: {}", stats.dimensions);
    println!("Vector search: {:?}", stats.ann);
    println!("Generation: {}", stats.generation);
    println!("Domains:");
    for (domain, count) in &stats.domains {
        println!("  {}: {} passages", domain, count);
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = format!("# techdoc configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created configuration file: {}", path.display());
    Ok(())
}
