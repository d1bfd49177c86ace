//! Operational CLI around the broker adapters. Thin shell: no strategy
//! logic lives here.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use trader_broker::create_broker;
use trader_config::Settings;
use trader_core::error::{Result, TraderError};
use trader_core::types::OrderType;

#[derive(Parser)]
#[command(name = "trader", about = "AI trading agent with a human-position sell guard")]
struct Cli {
    /// Broker mode override: sim | qmt | futu | auto
    #[arg(short, long, global = true)]
    mode: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOrderType {
    Market,
    Limit,
}

impl From<CliOrderType> for OrderType {
    fn from(t: CliOrderType) -> Self {
        match t {
            CliOrderType::Market => OrderType::Market,
            CliOrderType::Limit => OrderType::Limit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Buy shares
    Buy {
        symbol: String,
        amount: u64,
        /// Limit price (required for limit orders)
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, value_enum, default_value_t = CliOrderType::Market)]
        order_type: CliOrderType,
    },
    /// Sell shares (blocked unless the agent's own ledger covers the amount)
    Sell {
        symbol: String,
        amount: u64,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, value_enum, default_value_t = CliOrderType::Market)]
        order_type: CliOrderType,
    },
    /// Show the total/AI/manual position breakdown
    Position {
        symbol: Option<String>,
    },
    /// Quote a symbol through the broker's price source
    Price {
        symbol: String,
    },
    /// Replay the AI-position ledger for audit
    History {
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().map_err(|e| TraderError::Config(e.to_string()))?;

    match cli.command {
        Commands::Buy {
            symbol,
            amount,
            price,
            order_type,
        } => {
            let broker = create_broker(&settings, Some(&symbol), cli.mode.as_deref())?;
            let outcome = broker.buy(&symbol, amount, price, order_type.into()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Sell {
            symbol,
            amount,
            price,
            order_type,
        } => {
            let broker = create_broker(&settings, Some(&symbol), cli.mode.as_deref())?;
            let outcome = broker.sell(&symbol, amount, price, order_type.into()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Position { symbol } => {
            let broker = create_broker(&settings, symbol.as_deref(), cli.mode.as_deref())?;
            let view = broker.position(symbol.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Price { symbol } => {
            let broker = create_broker(&settings, Some(&symbol), cli.mode.as_deref())?;
            let price = broker.price(&symbol).await?;
            println!("{{\"symbol\": \"{}\", \"price\": {}}}", symbol, price);
        }
        Commands::History { symbol } => {
            let broker = create_broker(&settings, symbol.as_deref(), cli.mode.as_deref())?;
            for entry in broker.ledger().history(symbol.as_deref())? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }
    Ok(())
}
