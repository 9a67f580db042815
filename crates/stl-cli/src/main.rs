mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::settle::{PlaceArgs, SettlementFailure};
use commands::{ledger, load_config, settle, Client};

#[derive(Parser)]
#[command(name = "stl")]
#[command(about = "Settlement ledger client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the configured party (offline)
    Party {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Resolve a short template id (Module:Entity) to its package-qualified form
    Qualify {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        template: String,
    },

    /// Active contracts visible to the configured party
    Query {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Record type (short or qualified)
        #[arg(long, conflicts_with = "contract_ids")]
        template: Option<String>,

        /// Contract ids (repeatable)
        #[arg(long = "contract-id")]
        contract_ids: Vec<String>,

        /// Ledger offset; defaults to the current ledger end
        #[arg(long)]
        offset: Option<String>,
    },

    /// Holdings of one currency owned by the configured party
    Holdings {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        currency: String,
    },

    /// Lock funds and place an order against the allocation
    Place {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        currency: String,

        /// Amount to lock (decimal text)
        #[arg(long)]
        amount: String,

        /// buy | sell
        #[arg(long)]
        side: String,

        #[arg(long)]
        price: String,

        #[arg(long)]
        quantity: String,

        #[arg(long)]
        instrument: String,
    },

    /// Cancel an order and release its allocation in one submission
    Cancel {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Order contract id
        #[arg(long)]
        order_cid: String,
    },

    /// Release a leftover allocation (after an unconfirmed or failed settlement)
    Release {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Allocation contract id
        #[arg(long)]
        allocation_cid: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env.local if present (dev convenience). Production injects env
    // vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<SettlementFailure>()
            .map(SettlementFailure::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let (loaded, _) = load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Party { config_paths } => {
            let (_, cfg) = load_config(&config_paths)?;
            ledger::party(cfg.party()?)?;
        }

        Commands::Qualify {
            config_paths,
            template,
        } => {
            let client = connect(&config_paths)?;
            ledger::qualify(&client, &template).await?;
        }

        Commands::Query {
            config_paths,
            template,
            contract_ids,
            offset,
        } => {
            let client = connect(&config_paths)?;
            ledger::query(&client, template.as_deref(), contract_ids, offset.as_deref()).await?;
        }

        Commands::Holdings {
            config_paths,
            currency,
        } => {
            let client = connect(&config_paths)?;
            ledger::holdings(&client, &currency).await?;
        }

        Commands::Place {
            config_paths,
            currency,
            amount,
            side,
            price,
            quantity,
            instrument,
        } => {
            let client = connect(&config_paths)?;
            settle::place(
                &client,
                PlaceArgs {
                    currency,
                    amount,
                    side,
                    price,
                    quantity,
                    instrument,
                },
            )
            .await?;
        }

        Commands::Cancel {
            config_paths,
            order_cid,
        } => {
            let client = connect(&config_paths)?;
            settle::cancel(&client, &order_cid).await?;
        }

        Commands::Release {
            config_paths,
            allocation_cid,
        } => {
            let client = connect(&config_paths)?;
            settle::release(&client, &allocation_cid).await?;
        }
    }

    Ok(())
}

fn connect(config_paths: &[String]) -> Result<Client> {
    let (loaded, cfg) = load_config(config_paths)?;
    tracing::debug!(config_hash = %loaded.config_hash, base_url = %cfg.ledger.base_url, "config loaded");
    Client::connect(cfg)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
