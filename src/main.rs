use anyhow::Result;
use clap::Parser;
use waveflow::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    waveflow::cli::run(cli).await
}
