use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "bucketeer", version, about = "Bank statement reconciliation and bucket balances")]
struct Cli {
    /// Directory holding the ledger database (defaults to the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import statement files (.csv or .pdf), merging duplicates into the store
    Import {
        /// Files to import, processed strictly in order
        files: Vec<PathBuf>,
    },
    /// Show accounts detected from the stored transactions
    Accounts,
    /// List buckets, or load definitions from a TOML file
    Buckets {
        /// Load bucket definitions (and starting allocations) from this file
        #[arg(long)]
        from_toml: Option<PathBuf>,
    },
    /// Suggest buckets from recurring description patterns
    Suggest,
    /// Auto-assign unclassified transactions to buckets by keyword
    Classify,
    /// Show bucket balances per account
    Balances {
        /// Restrict to one account number
        #[arg(long)]
        account: Option<String>,
        #[arg(long, value_enum, default_value_t = BalanceMode::Assigned)]
        mode: BalanceMode,
    },
    /// Export bucket balances as CSV
    Export { output: PathBuf },
    /// Print a plain-text balance summary
    Summary,
    /// Dump every transaction with resolved metadata as CSV
    Diagnostics { output: PathBuf },
    /// Delete imported transactions and session data, preserving saved
    /// accounts, buckets and starting allocations
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BalanceMode {
    /// Keyword fan-out: a transaction counts toward every matching bucket
    Keyword,
    /// Explicit classifications: at most one bucket per transaction
    Assigned,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => directories::ProjectDirs::from("com", "bucketeer", "Bucketeer")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&data_dir)?;

    let pool = bucketeer_storage::create_db(&data_dir.join("ledger.db")).await?;

    match cli.command {
        Command::Import { files } => commands::import(&pool, &files).await,
        Command::Accounts => commands::accounts(&pool).await,
        Command::Buckets { from_toml } => commands::buckets(&pool, from_toml.as_deref()).await,
        Command::Suggest => commands::suggest(&pool).await,
        Command::Classify => commands::classify(&pool).await,
        Command::Balances { account, mode } => {
            commands::balances(&pool, account.as_deref(), mode).await
        }
        Command::Export { output } => commands::export(&pool, &output).await,
        Command::Summary => commands::summary(&pool).await,
        Command::Diagnostics { output } => commands::diagnostics(&pool, &output).await,
        Command::Reset { yes } => commands::reset(&pool, yes).await,
    }
}
