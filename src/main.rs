mod ai_composer;
mod app;
mod auth;
mod config;
mod dataset;
mod extractor;
mod logger;
mod mailer;
mod models;
mod utils;

use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Personalized cold-outreach email campaigns from a job posting URL")]
struct Cli {
    /// Run the pipeline but skip authentication and sending (for debugging)
    #[arg(long)]
    dry_run: bool,

    /// Skip the interactive confirmation prompts
    #[arg(long)]
    yes: bool,

    /// Mirror debug logging to the console
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::run_pipeline(cli.dry_run, cli.yes, cli.verbose).await
}
