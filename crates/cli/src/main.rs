use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;
mod services;

#[derive(Parser)]
#[command(name = "vault-keeper")]
#[command(about = "Position keeper for delta-neutral vaults", long_about = None)]
struct Cli {
    /// Config file path (defaults to config/Config.toml plus environment)
    #[arg(short, long, global = true, env = "VAULT_KEEPER_CONFIG")]
    config: Option<String>,

    /// Config profile layered over the base file, e.g. "paper"
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keeper jobs with the web API
    Run {
        /// In-memory store, static quotes and a simulated ledger
        #[arg(long)]
        paper: bool,
        /// Optional log file path (logs to file instead of stderr)
        #[arg(long)]
        log_file: Option<String>,
    },
    /// Run one keeper job once and exit
    RunOnce {
        /// Job name: entry, valuation, drift-monitor, safety-check, strategy
        #[arg(short, long)]
        job: String,
        #[arg(long)]
        paper: bool,
    },
    /// Start only the health and reporting API
    Serve {
        /// Server address (defaults to the configured host and port)
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Record a user deposit as a pending_entry position
    Deposit {
        #[arg(long)]
        user: String,
        /// Trading pair, e.g. TON-USDT
        #[arg(long)]
        pair: String,
        /// Vault address, raw or user-friendly
        #[arg(long)]
        vault: String,
        #[arg(long)]
        principal: Decimal,
        #[arg(long)]
        strategy_id: Option<i32>,
    },
}

fn init_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { log_file, .. } => log_file.as_deref(),
        _ => None,
    };
    init_logging(log_file)?;

    let config = commands::load_config(cli.config.as_deref(), cli.profile.as_deref())?;

    match cli.command {
        Commands::Run { paper, .. } => {
            commands::run::run_keeper(config, paper).await?;
        }
        Commands::RunOnce { job, paper } => {
            commands::run_once::run_job_once(config, &job, paper).await?;
        }
        Commands::Serve { addr } => {
            commands::serve::run_server(config, addr).await?;
        }
        Commands::Deposit {
            user,
            pair,
            vault,
            principal,
            strategy_id,
        } => {
            commands::deposit::record_deposit(
                config,
                commands::deposit::DepositArgs {
                    user,
                    pair,
                    vault,
                    principal,
                    strategy_id,
                },
            )
            .await?;
        }
    }

    Ok(())
}
