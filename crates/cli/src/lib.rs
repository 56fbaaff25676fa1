use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use config::SettingsArgs;
use docrag_protocol::{serialize_json, QueryRequest, DEFAULT_TOP_K};
use docrag_text_chunker::Chunker;
use parser::{BuiltinParser, DocumentParser};
use service::RagService;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod config;
pub mod http_api;
pub mod llm;
pub mod parser;
pub mod service;

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

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Document retrieval and question answering over a local vector store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (POST /upload, POST /query, GET /health)
    Serve(ServeArgs),

    /// Index files into a fresh store and answer one question
    Ask(AskArgs),

    /// Print the chunks of a file as a JSON array
    Chunk(ChunkArgs),

    /// Print JSON Schemas of the HTTP request and response bodies
    Schema,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "DOCRAG_BIND", default_value = "127.0.0.1:8000")]
    bind: String,
}

#[derive(Args)]
struct AskArgs {
    /// Files to index before asking (repeatable)
    #[arg(long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Question to answer
    #[arg(long)]
    question: String,

    /// Number of chunks to retrieve
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

#[derive(Args)]
struct ChunkArgs {
    /// File to chunk
    #[arg(long)]
    file: PathBuf,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Serve(args) => serve(args, &cli.settings).await?,
        Commands::Ask(args) => run_ask(args, &cli.settings).await?,
        Commands::Chunk(args) => run_chunk(&args, &cli.settings)?,
        Commands::Schema => print_stdout(&serde_json::to_string_pretty(
            &docrag_protocol::api_schemas()?,
        )?)?,
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    Ok((filename, bytes))
}

fn run_chunk(args: &ChunkArgs, settings: &SettingsArgs) -> Result<()> {
    let config = settings.resolve()?;
    let chunker = Chunker::new(config.chunking)?;
    let (filename, bytes) = read_file(&args.file)?;

    let texts = BuiltinParser.parse(&filename, &bytes)?;
    let chunks: Vec<String> = chunker
        .chunk_all(texts.iter().map(String::as_str))
        .into_iter()
        .map(|chunk| chunk.text)
        .collect();
    log::info!("{filename}: {} chunks", chunks.len());
    print_stdout(&serialize_json(&chunks)?)
}

async fn run_ask(args: AskArgs, settings: &SettingsArgs) -> Result<()> {
    let config = settings.resolve()?;
    let service = RagService::from_config(&config)?;

    for path in &args.files {
        let (filename, bytes) = read_file(path)?;
        service
            .ingest(&filename, &bytes)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
    }

    let mut request = QueryRequest::new(args.question);
    request.top_k = args.top_k;
    let response = service.query(&request).await?;
    print_stdout(&serialize_json(&response)?)
}

async fn serve(args: ServeArgs, settings: &SettingsArgs) -> Result<()> {
    let config = settings.resolve()?;
    let service = Arc::new(RagService::from_config(&config)?);
    let app = http_api::router(service);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving docrag API: {base_url}"))?;
    print_stdout(&format!("Try: curl {base_url}/health"))?;
    print_stdout(&format!("Try: curl -F file=@notes.txt {base_url}/upload"))?;
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/query -H 'Content-Type: application/json' -d '{{\"question\": \"...\"}}'"
    ))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Shutting down"),
                Err(err) => {
                    log::warn!("Ctrl-C handler unavailable ({err}); serving until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;
    Ok(())
}
