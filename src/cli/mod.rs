mod commands;

pub use commands::ServeCommand;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mermaid-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "HTTP service that renders mermaid diagrams to SVG or PNG and caches the results",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Serve(ServeCommand),
}

impl Cli {
    pub async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match &self.command {
            Commands::Serve(cmd) => cmd.execute().await,
        }
    }
}
