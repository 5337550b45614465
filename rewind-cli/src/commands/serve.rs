use anyhow::{Context, Result};
use colored::Colorize;
use rewind_core::RollbackEngine;
use rewind_server::RewindServer;
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn run(engine: RollbackEngine, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    println!("{}", "Starting rewind server...".bold().cyan());
    println!("   {}: {}", "Metadata".bold(), engine.config().metadata_dir);
    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://{}", addr).green()
    );
    println!();
    println!("{}", "Every request names its repository with cwd".dimmed());
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    RewindServer::with_engine(Arc::new(engine)).serve(addr).await
}
