//! Command-line interface.

mod commands;
mod helpers;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use url::Url;

use mailsort::config::Settings;
use mailsort::providers::ProviderId;

#[derive(Parser)]
#[command(name = "mailsort")]
#[command(about = "Extract postal addresses from envelope images and pick a sorting center")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ./mailsort.toml or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the address from an envelope image
    Extract {
        /// Path to the envelope image
        image: PathBuf,
        /// Provider to try first (ocr_service, router, gemini)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<ProviderId>,
        /// Model to use instead of the configured one
        #[arg(short, long)]
        model: Option<String>,
        /// OCR service endpoint for this call
        #[arg(long)]
        endpoint: Option<Url>,
        /// Per-attempt timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Do not record the scan in the history database
        #[arg(long)]
        no_store: bool,
    },

    /// Show configured providers and fallback order
    Providers,

    /// Show recent scans
    History {
        /// Number of scans to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_provider(value: &str) -> Result<ProviderId, String> {
    ProviderId::from_str(value).ok_or_else(|| {
        format!(
            "unknown provider '{}' (expected one of: ocr_service, router, gemini)",
            value
        )
    })
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            image,
            provider,
            model,
            endpoint,
            timeout,
            json,
            no_store,
        } => {
            let args = commands::ExtractArgs {
                image,
                provider,
                model,
                endpoint,
                timeout: timeout.map(Duration::from_secs),
                json,
                store: !no_store,
            };
            commands::cmd_extract(&settings, args).await
        }
        Commands::Providers => commands::cmd_providers(&settings).await,
        Commands::History { limit, json } => commands::cmd_history(&settings, limit, json).await,
    }
}
