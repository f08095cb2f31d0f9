//! `logtail` follows files and named pipes, surviving rotation and truncation,
//! and prints each completed line to stdout.

mod app;
mod cli;
mod filter;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = cli::parse();
    app::run(config).await
}
