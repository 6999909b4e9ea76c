use anyhow::{Context as AnyhowContext, Result};
use axum::{
    routing::{get, post},
    Router,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docrag_chunker::Chunker;
use docrag_retrieval::{IndexReport, IngestionResult, RetrievalConfig, RetrievalService, SearchResponse};
use docrag_vector_store::{EmbeddingMode, EmbeddingModel, EmbeddingOptions, MetadataValue};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod http_api;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Semantic search over PDF documents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML configuration file (overrides DOCRAG_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vector store file (overrides DOCRAG_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Directory that document filenames are resolved against
    #[arg(long, global = true)]
    documents_dir: Option<PathBuf>,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Model directory (overrides DOCRAG_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Chunk size in characters
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks of a page
    #[arg(long, global = true)]
    overlap: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the indexing and search API over HTTP
    #[command(name = "serve-http")]
    ServeHttp(ServeArgs),

    /// Index a PDF from the documents directory
    Index(IndexArgs),

    /// Search indexed chunks
    Search(SearchArgs),

    /// Show how a PDF would be chunked, without indexing it
    Chunk(ChunkArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,
}

#[derive(Args)]
struct IndexArgs {
    /// File name relative to the documents directory
    filename: String,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Maximum number of hits
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ChunkArgs {
    /// File name relative to the documents directory
    filename: String,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Fast,
    Stub,
}

impl EmbedMode {
    const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedMode::Fast => EmbeddingMode::Fast,
            EmbedMode::Stub => EmbeddingMode::Stub,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers
    let json_output = match &cli.command {
        Commands::Index(args) => args.json,
        Commands::Search(args) => args.json,
        Commands::Chunk(args) => args.json,
        Commands::ServeHttp(_) => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT is extremely noisy
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = build_config(&cli)?;
    let service = build_service(&cli, &config).await?;

    match cli.command {
        Commands::ServeHttp(args) => serve_http(args, service).await?,
        Commands::Index(args) => run_index(args, &service).await?,
        Commands::Search(args) => run_search(args, &service).await?,
        Commands::Chunk(args) => run_chunk(args, &service).await?,
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<RetrievalConfig> {
    let mut config = RetrievalConfig::load(cli.config.as_deref())?;
    if let Some(path) = &cli.store {
        config.store_path = path.clone();
    }
    if let Some(dir) = &cli.documents_dir {
        config.documents_dir = dir.clone();
    }
    if let Some(size) = cli.chunk_size {
        config.chunker.chunk_size = size;
    }
    if let Some(overlap) = cli.overlap {
        config.chunker.overlap = overlap;
    }
    config.validate()?;
    log::debug!(
        "Store: {} | Documents: {} | Chunking: {}/{}",
        config.store_path.display(),
        config.documents_dir.display(),
        config.chunker.chunk_size,
        config.chunker.overlap
    );
    Ok(config)
}

fn embedding_options(cli: &Cli) -> Result<EmbeddingOptions> {
    let mut options = EmbeddingOptions::from_env()?;
    if let Some(mode) = cli.embed_mode {
        options.mode = mode.as_domain();
    }
    if let Some(model) = &cli.embed_model {
        options.model_id = model.clone();
    }
    if let Some(dir) = &cli.model_dir {
        options.model_dir = dir.clone();
    }
    // Previews never embed; the stub keeps the model's dimension without loading assets
    if matches!(cli.command, Commands::Chunk(_)) {
        options.mode = EmbeddingMode::Stub;
    }
    Ok(options)
}

async fn build_service(cli: &Cli, config: &RetrievalConfig) -> Result<RetrievalService> {
    let options = embedding_options(cli)?;
    let embedder = EmbeddingModel::with_options(&options)
        .with_context(|| format!("Failed to load embedding model '{}'", options.model_id))?;
    let service = RetrievalService::open(config, Arc::new(embedder))
        .await
        .with_context(|| format!("Failed to open store {}", config.store_path.display()))?;
    Ok(service)
}

async fn run_index(args: IndexArgs, service: &RetrievalService) -> Result<()> {
    let report = service.index_file(&args.filename).await?;
    if args.json {
        return print_json(&report);
    }
    print_stdout(&format_index_report(&report))
}

async fn run_search(args: SearchArgs, service: &RetrievalService) -> Result<()> {
    let response = service.search(&args.query, args.top_k).await?;
    if args.json {
        return print_json(&response);
    }
    print_stdout(&format_search_response(&response))
}

async fn run_chunk(args: ChunkArgs, service: &RetrievalService) -> Result<()> {
    let preview = service.preview_file(&args.filename).await?;
    if args.json {
        return print_json(&preview);
    }
    print_stdout(&format_preview(&preview))
}

fn format_index_report(report: &IndexReport) -> String {
    format!(
        "Indexed {}: {} chunks from {} pages",
        report.document_name, report.indexed_chunks, report.total_pages
    )
}

fn format_search_response(response: &SearchResponse) -> String {
    if response.hits.is_empty() {
        return format!("No results for \"{}\"", response.query);
    }

    let mut out = format!("Results for \"{}\":", response.query);
    for (rank, hit) in response.hits.iter().enumerate() {
        let document = hit
            .metadata
            .get("document")
            .and_then(MetadataValue::as_str)
            .unwrap_or("?");
        let page = hit
            .metadata
            .get("page_number")
            .and_then(MetadataValue::as_i64)
            .map_or_else(|| "?".to_string(), |p| p.to_string());
        out.push_str(&format!(
            "\n{}. [{:.3}] {document} p.{page}\n   {}",
            rank + 1,
            hit.score,
            snippet(&hit.text, 160)
        ));
    }
    out
}

fn format_preview(preview: &IngestionResult) -> String {
    let mut out = format!(
        "{}: {} pages, {} chunks\n{}",
        preview.document_name,
        preview.total_pages,
        preview.total_chunks,
        Chunker::get_stats(&preview.chunks)
    );
    for chunk in &preview.chunks {
        out.push_str(&format!(
            "\n#{} p.{} ({} chars) {}",
            chunk.chunk_id,
            chunk.page_number,
            chunk.char_len(),
            snippet(&chunk.text, 80)
        ));
    }
    out
}

/// First `max_chars` characters on one line
fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

async fn serve_http(args: ServeArgs, service: RetrievalService) -> Result<()> {
    let state = Arc::new(http_api::HttpState {
        service: Arc::new(service),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving docrag API: {base_url}"))?;
    print_stdout(&format!("Try: curl {base_url}/health"))?;
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/search -H 'Content-Type: application/json' -d '{{\"query\":\"...\"}}'"
    ))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<http_api::HttpState>) -> Router {
    Router::new()
        .route("/index/pdf", post(http_api::index_pdf))
        .route("/search", post(http_api::search))
        .route("/health", get(http_api::health))
        .route("/stats", get(http_api::stats))
        .with_state(state)
}
