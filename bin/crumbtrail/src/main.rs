mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "crumbtrail")]
#[command(about = "Cookie provenance crawler: visits targets, attributes cookies to the requests that set them, and keeps a durable crawl ledger", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one url or a list of targets
    Run {
        /// Single URL to crawl
        #[arg(short, long, conflicts_with = "file")]
        url: Option<String>,

        /// File with targets, one `url[,category]` per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Seconds to dwell on each page (overrides config)
        #[arg(short, long)]
        time: Option<u64>,

        /// Base directory for profiles, captures and the ledger
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Path to the browser executable
        #[arg(long)]
        browser: Option<String>,

        /// Launch a visible browser window
        #[arg(long)]
        headed: bool,

        /// Connect the configured VPN for the duration of the run
        #[arg(long)]
        vpn: bool,
    },

    /// Inspect the crawl ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Correlate a dumped performance log offline (JSONL, one event per line)
    Replay {
        /// Performance log file
        log: PathBuf,
    },

    /// Run environment diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Print all ledger rows
    Show {
        /// Only show failed targets
        #[arg(long)]
        failed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            url,
            file,
            time,
            base_dir,
            browser,
            headed,
            vpn,
        } => {
            commands::run_cmd::run(url, file, time, base_dir, browser, headed, vpn).await?;
        }
        Commands::Ledger { command } => match command {
            LedgerCommands::Show { failed } => {
                commands::ledger_cmd::show(failed)?;
            }
        },
        Commands::Replay { log } => {
            commands::replay_cmd::run(&log).await?;
        }
        Commands::Doctor => {
            commands::doctor::run()?;
        }
    }

    Ok(())
}
