//! Bridge relay
//!
//! Watches the bridge contract on every configured chain and releases funds
//! on the destination chain of each deposit. Also runs one-shot operator
//! commands against a single chain.

use std::sync::Arc;

use alloy::primitives::U256;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use tracing::{error, info, warn};

use bridge_relay::commands::{self, OperatorCommand};
use bridge_relay::config::{Config, LogFormat};
use bridge_relay::listener::ChainListener;
use bridge_relay::rpc::EvmRpc;
use bridge_relay::server;
use bridge_relay::shutdown::{wait_for_shutdown_signal, ShutdownCoordinator};
use bridge_relay::writer::{BridgeWriter, DryRunWriter};
use bridge_relay::{ChainRegistry, EventCatalog, RelayContext};

#[derive(Parser)]
#[command(name = "bridge-relay")]
#[command(about = "Cross-chain bridge relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Filter logs from every contract, not only the bridge
    #[arg(short = 'a', long = "scan-all", global = true)]
    scan_all: bool,

    /// Log unrecognized topics
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the listeners (default)
    Relay,

    /// Deposit funds for release on another chain
    Deposit {
        #[arg(long)]
        chain: String,
        /// Amount in wei
        #[arg(long)]
        value: u128,
        /// Destination chain ID
        #[arg(long)]
        to: u64,
    },

    /// Withdraw funds to another chain
    WithdrawTo {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        value: u128,
        #[arg(long)]
        to: u64,
    },

    /// Send funds to the bridge contract
    Fund {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        value: u128,
    },

    /// Pay the bridge contract
    Pay {
        #[arg(long)]
        chain: String,
        #[arg(long)]
        value: u128,
    },
}

impl Commands {
    fn into_operator(self) -> Result<OperatorCommand> {
        Ok(match self {
            Commands::Deposit { chain, value, to } => OperatorCommand::Deposit {
                chain,
                value: U256::from(value),
                to,
            },
            Commands::WithdrawTo { chain, value, to } => OperatorCommand::WithdrawTo {
                chain,
                value: U256::from(value),
                to,
            },
            Commands::Fund { chain, value } => OperatorCommand::Fund {
                chain,
                value: U256::from(value),
            },
            Commands::Pay { chain, value } => OperatorCommand::Pay {
                chain,
                value: U256::from(value),
            },
            Commands::Relay => return Err(eyre!("relay is not an operator command")),
        })
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    init_logging(config.log_format);

    if cli.scan_all {
        config.options.scan_all_contracts = true;
    }
    if cli.verbose {
        config.options.verbose = true;
    }

    info!(
        chains = config.chains.len(),
        scan_all = config.options.scan_all_contracts,
        "Configuration loaded"
    );

    let registry = Arc::new(ChainRegistry::new(config.chains.clone())?);
    let events = EventCatalog::new(&config.events)?;
    let writer: Arc<dyn BridgeWriter> = Arc::new(DryRunWriter::new(&registry));

    match cli.command.unwrap_or(Commands::Relay) {
        Commands::Relay => run_relay(config, registry, events, writer).await,
        other => {
            let command = other.into_operator()?;
            commands::execute(&command, &registry, writer.as_ref()).await
        }
    }
}

async fn run_relay(
    config: Config,
    registry: Arc<ChainRegistry>,
    events: EventCatalog,
    writer: Arc<dyn BridgeWriter>,
) -> Result<()> {
    let ctx = Arc::new(RelayContext::new(
        registry.clone(),
        events,
        writer,
        config.options.clone(),
    ));

    // any chain failing to connect stops startup
    let connected = futures::future::try_join_all(registry.iter().map(|chain| async move {
        let rpc = EvmRpc::connect(chain).await?;
        Ok::<_, eyre::Report>((chain.clone(), rpc))
    }))
    .await?;

    let mut coordinator = ShutdownCoordinator::new(config.options.shutdown_timeout);
    for (chain, rpc) in connected {
        coordinator.spawn(ChainListener::new(chain, Arc::new(rpc), ctx.clone()));
    }
    info!(listeners = coordinator.listener_count(), "Listeners started");

    let state = ctx.app_state();
    let bind_address = config.api_bind_address.clone();
    let port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = server::start_server(&bind_address, port, state).await {
            error!(error = %e, "API server error");
        }
    });

    wait_for_shutdown_signal().await;

    let report = coordinator.shutdown().await;
    for exit in &report.acknowledged {
        info!(
            chain = %exit.chain_name,
            last_block = exit.last_block,
            cleanup_ok = exit.cleanup_ok,
            "Chain stopped"
        );
    }
    if !report.missing.is_empty() {
        warn!(missing = ?report.missing, "Some listeners did not acknowledge shutdown");
    }
    info!(clean = report.is_clean(), "Bridge relay stopped");

    std::process::exit(1);
}

/// Initialize tracing/logging with structured output
fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_relay=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init(),
    }
}
