//! `ido` command line tool
//!
//! Deploys a sale manager onto an in-memory ledger and runs presale
//! scenarios against it, printing JSON reports to stdout.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ido_sdk::{
    init_tracing, Address, EnvironmentConfig, IdoClient, Ledger, PresaleEvent,
    ProjectDetails, NATIVE_DECIMALS, U256,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "ido", author, version, about = "Token presale manager")]
struct Cli {
    /// Configuration file (defaults to ido.toml / config.toml discovery)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy the sale template and the manager, print both addresses
    Deploy {
        /// Manager owner (defaults to the configured owner, then the deployer)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Create a sale and run investments, claims and a withdrawal against it
    Simulate {
        /// Hard cap in native units (decimal, e.g. 5 or 2.5)
        #[arg(long)]
        hard_cap: Option<String>,

        /// Sale tokens per native unit (decimal)
        #[arg(long)]
        rate: Option<String>,

        /// Amount invested by a fresh investor, in native units; repeatable
        #[arg(long = "invest", value_name = "AMOUNT")]
        investments: Vec<String>,

        /// Have every investor claim after investing
        #[arg(long)]
        claim: bool,

        /// Have the sale owner withdraw the raised funds
        #[arg(long)]
        withdraw: bool,
    },

    /// Configuration helpers
    Config {
        /// Write a default configuration file to PATH
        #[arg(long, value_name = "PATH")]
        generate: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let report = match cli.command {
        Commands::Config { generate } => {
            EnvironmentConfig::generate_default_config()
                .save_to_file(&generate)
                .with_context(|| format!("writing {}", generate.display()))?;
            serde_json::json!({ "written": generate })
        }
        Commands::Deploy { owner } => deploy(load_config(cli.config)?, owner)?,
        Commands::Simulate {
            hard_cap,
            rate,
            investments,
            claim,
            withdraw,
        } => simulate(
            load_config(cli.config)?,
            hard_cap,
            rate,
            investments,
            claim,
            withdraw,
        )?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Load configuration and install the tracing subscriber it describes
fn load_config(path: Option<PathBuf>) -> Result<EnvironmentConfig> {
    let config = match path {
        Some(path) => EnvironmentConfig::load_from_path(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EnvironmentConfig::load().context("loading configuration")?,
    };
    init_tracing(&config.logging)?;
    Ok(config)
}

fn deploy(mut config: EnvironmentConfig, owner: Option<String>) -> Result<serde_json::Value> {
    if let Some(owner) = owner {
        Address::from_str(&owner).map_err(|e| anyhow!("invalid owner '{}': {}", owner, e))?;
        config.manager.owner = Some(owner);
    }

    let client = IdoClient::local(random_address(), config)?;
    let deployment = client.deployment();
    info!(
        template = %deployment.sale_template,
        manager = %deployment.manager,
        "Deployment complete"
    );

    Ok(serde_json::json!({
        "saleTemplate": deployment.sale_template,
        "manager": deployment.manager,
        "owner": deployment.owner,
        "deployer": deployment.deployer,
        "deployedAt": deployment.deployed_at,
    }))
}

fn simulate(
    config: EnvironmentConfig,
    hard_cap: Option<String>,
    rate: Option<String>,
    investments: Vec<String>,
    claim: bool,
    withdraw: bool,
) -> Result<serde_json::Value> {
    let hard_cap = match hard_cap {
        Some(raw) => parse_ether(&raw)?,
        None => config.get_default_hard_cap()?,
    };
    let exchange_rate = match rate {
        Some(raw) => parse_ether(&raw)?,
        None => config.get_default_exchange_rate()?,
    };

    let client = IdoClient::local(random_address(), config)?;
    let ledger = client.ledger().clone();
    let manager = client.manager().clone();
    let mut events = manager.subscribe();

    let creator = random_address();
    let supply = client.required_allowance(exchange_rate, hard_cap)?;
    let token = ledger.deploy_token(creator, "Presale Token", "PST", NATIVE_DECIMALS, supply);
    ledger.approve(token, creator, manager.address(), supply)?;

    let sale = manager.create_presale(
        creator,
        exchange_rate,
        hard_cap,
        token,
        ProjectDetails::described("Simulated presale"),
    )?;

    let mut investors = Vec::with_capacity(investments.len());
    let mut outcomes = Vec::with_capacity(investments.len());
    for raw in &investments {
        let amount = parse_ether(raw)?;
        let investor = random_address();
        ledger.fund(investor, amount)?;

        let outcome = match manager.invest_into_presale(investor, sale, amount) {
            Ok(()) => {
                investors.push(investor);
                serde_json::json!({ "investor": investor, "amount": format_ether(amount), "ok": true })
            }
            Err(err) => {
                warn!(%investor, "Investment rejected: {}", err);
                serde_json::json!({ "investor": investor, "amount": format_ether(amount), "ok": false, "reason": err.reason() })
            }
        };
        outcomes.push(outcome);
    }

    let mut claims = Vec::new();
    if claim {
        for investor in &investors {
            let claimed = manager.claim_tokens_from_presale(*investor, sale)?;
            claims.push(serde_json::json!({
                "investor": investor,
                "tokens": format_ether(claimed),
                "tokenBalance": format_ether(ledger.token_balance(token, *investor)?),
            }));
        }
    }

    let withdrawn = if withdraw {
        Some(format_ether(manager.withdraw_fund_raised(creator, sale)?))
    } else {
        None
    };

    let mut emitted: Vec<PresaleEvent> = Vec::new();
    while let Ok(event) = events.try_recv() {
        emitted.push(event);
    }

    Ok(serde_json::json!({
        "manager": manager.address(),
        "sale": manager.sale_info(sale)?,
        "investments": outcomes,
        "claims": claims,
        "withdrawn": withdrawn,
        "ownerNativeBalance": format_ether(ledger.native_balance(creator)),
        "events": emitted,
    }))
}

fn random_address() -> Address {
    Address::from(rand::random::<[u8; 20]>())
}

/// Parse a decimal amount of whole units into 18-decimal base units
fn parse_ether(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let decimals = NATIVE_DECIMALS as usize;
    if fraction.len() > decimals {
        bail!("'{}' has more than {} decimal places", raw, decimals);
    }
    if whole.is_empty() && fraction.is_empty() {
        bail!("empty amount");
    }

    let digits = format!("{}{:0<width$}", whole, fraction, width = decimals);
    U256::from_str_radix(&digits, 10).map_err(|e| anyhow!("invalid amount '{}': {}", raw, e))
}

fn format_ether(amount: U256) -> String {
    let digits = amount.to_string();
    let decimals = NATIVE_DECIMALS as usize;
    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}
