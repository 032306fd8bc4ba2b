//! Emporium CLI - migrations, maintenance and the mail worker.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! emporium-cli migrate
//!
//! # Delete expired reset tokens, drafts and stale anonymous carts
//! emporium-cli sweep
//!
//! # Finish order follow-ups that did not complete at placement
//! emporium-cli reconcile --older-than-secs 300
//!
//! # Send queued transactional emails
//! emporium-cli mail-worker
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;
mod email;

#[derive(Parser)]
#[command(name = "emporium-cli")]
#[command(author, version, about = "Emporium CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Delete expired rows
    Sweep,
    /// Retry order confirmation emails and cart clearing
    Reconcile {
        /// Only orders placed at least this long ago
        #[arg(long, default_value_t = 300)]
        older_than_secs: u64,

        /// Maximum orders per run
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Consume the email queue
    MailWorker,
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emporium_cli=info,emporium_storefront=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Sweep => commands::sweep::run().await,
        Commands::Reconcile {
            older_than_secs,
            limit,
        } => commands::reconcile::run(Duration::from_secs(older_than_secs), limit).await,
        Commands::MailWorker => {
            let config = commands::mail_worker::WorkerConfig::from_env()?;
            commands::mail_worker::run(config).await
        }
    }
}
