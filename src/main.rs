//! # ragweave server
//!
//! Starts the HTTP/REST surface (C12) over the full retrieval-augmented
//! orchestration backend: metadata catalog, vector/hybrid/graph retrieval,
//! the agentic SQL pipeline, and the table-file analysis pipeline.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin ragweave -- --config config.toml
//! ```

use clap::Parser;
use ragweave::config::Config;
use ragweave::protocol::rest::start_http_server;
use ragweave::Handler;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ragweave", about = "Retrieval-augmented orchestration backend")]
struct Args {
    /// Path to a TOML config file, merged over `config.toml`/`config.local.toml`.
    #[arg(long)]
    config: Option<String>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|err| {
            eprintln!("config load failed ({err}), falling back to defaults");
            Config::default()
        }),
    };

    init_logging(&config.logging.level);
    tracing::info!(host = %config.http.host, port = config.http.port, "starting ragweave");

    let handler = Arc::new(Handler::new(config.clone())?);
    start_http_server(handler, &config.http).await
}
