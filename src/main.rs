use anyhow::Context;
use clap::Parser;
use mcp_ai_prompts::{PromptLibrary, PromptServer, StorageCoordinator, StoragePaths};
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local prompts file and the storage configuration
    #[arg(long, env = "MCP_AI_PROMPTS_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "MCP_AI_PROMPTS_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // stdout carries the MCP transport, so logs go to stderr.
    // Example: RUST_LOG=mcp_ai_prompts=debug,rmcp=info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .with_context(|| format!("Invalid log level '{}'", args.log_level))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let paths = match args.data_dir {
        Some(dir) => StoragePaths::new(dir),
        None => StoragePaths::from_home(),
    };
    tracing::info!(data_dir = %paths.data_dir().display(), "Starting MCP AI prompts server");

    let coordinator = StorageCoordinator::new(paths);
    coordinator.initialize().await;
    let active_path = coordinator.active_path().await;
    tracing::info!(
        provider = %coordinator.active_provider().await,
        path = %active_path.display(),
        "Storage ready"
    );

    let server = PromptServer::new(PromptLibrary::new(Arc::new(coordinator)));
    let service = server
        .serve(stdio())
        .await
        .context("Failed to start MCP stdio transport")?;
    service.waiting().await.context("MCP server terminated abnormally")?;

    tracing::info!("MCP AI prompts server stopped");
    Ok(())
}
