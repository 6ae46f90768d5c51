use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod prompt;
mod session;

use prompt::rustyline::{RustylinePrompt, Theme};
use session::Session;
use toolchat::agent::Agent;
use toolchat::settings::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file to load (defaults to config/settings.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG when it is set
    #[arg(long)]
    log_level: Option<String>,

    /// Send a single message, print the reply and exit
    #[arg(short, long)]
    text: Option<String>,

    /// Render replies with a theme suited to light terminals
    #[arg(long)]
    light: bool,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    setup_logging(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    let agent = Agent::from_settings(&settings).context("Failed to start the agent")?;
    let theme = if cli.light { Theme::Light } else { Theme::Dark };
    let prompt = RustylinePrompt::new(theme)?;
    let mut session = Session::new(agent, Box::new(prompt));

    match cli.text {
        Some(text) => session.headless_start(text).await,
        None => session.start().await,
    }
}
