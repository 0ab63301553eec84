//! Pocket filesystem tool server
//!
//! A read-only MCP server over stdio. Configuration comes from the
//! environment:
//! - `POCKET_FS_ROOT`: directory the server may read (default `.`)
//! - `POCKET_FS_READ_LIMIT`: maximum bytes per `read_file` (default 200000)
//!
//! Stdout carries the protocol, so logs go to stderr.

mod fs;
mod handler;

use std::sync::Arc;

use anyhow::Context;
use pocket_mcp::{McpServer, ServerStdioTransport};

use fs::{DEFAULT_READ_LIMIT, FsRoot};
use handler::{FsHandler, SERVER_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let root_dir = std::env::var("POCKET_FS_ROOT").unwrap_or_else(|_| ".".to_string());
    let read_limit = match std::env::var("POCKET_FS_READ_LIMIT") {
        Ok(value) => value
            .parse::<usize>()
            .with_context(|| format!("Invalid POCKET_FS_READ_LIMIT: {}", value))?,
        Err(_) => DEFAULT_READ_LIMIT,
    };

    let root = FsRoot::new(&root_dir, read_limit)
        .with_context(|| format!("Cannot open root directory {}", root_dir))?;
    tracing::info!(root = %root.path().display(), read_limit, "Starting filesystem server");

    let server = McpServer::new(Arc::new(FsHandler::new(root))).with_name(SERVER_NAME);
    server.serve(ServerStdioTransport::new()).await?;

    Ok(())
}
