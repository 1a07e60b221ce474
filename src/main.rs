use clap::Parser;
use mermaid_server::cli::Cli;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    cli.execute().await
}
