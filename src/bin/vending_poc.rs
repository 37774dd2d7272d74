//! STS Token Vending - Proof of Concept
//!
//! Command-line front end for the token codec:
//! 1. Derive vending and decoder keys for a meter
//! 2. Issue credit tokens against a persisted ledger
//! 3. Redeem tokens with replay rejection and report balances
//!
//! Running without a subcommand plays the end-to-end demo.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sts_token_codec::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "vending_poc", about = "STS-style prepaid token vending")]
struct Args {
    /// Vending configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the issued/applied token ledgers.
    #[arg(long, global = true, default_value = "sts-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a meter's vending key (base64).
    VendingKey {
        #[arg(long)]
        serial: SerialNumber,
    },
    /// Print a meter's decoder key (hex).
    DecoderKey {
        #[arg(long)]
        serial: SerialNumber,
    },
    /// Issue a token for an amount, e.g. `692.5`.
    Issue {
        #[arg(long)]
        serial: SerialNumber,
        #[arg(long)]
        amount: Amount,
    },
    /// Apply a token to a meter.
    Redeem {
        #[arg(long)]
        serial: SerialNumber,
        #[arg(long)]
        token: TokenNumber,
    },
    /// Show a meter's accumulated credit.
    Balance {
        #[arg(long)]
        serial: SerialNumber,
    },
    /// Run the in-memory end-to-end demo.
    Demo,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<VendingConfig> {
    match path {
        Some(path) => VendingConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(VendingConfig::default()),
    }
}

fn open_service(args: &Args) -> Result<TokenService<JsonFileLedger>> {
    let config = load_config(args.config.as_deref())?;
    let service = TokenService::new(
        config,
        JsonFileLedger::new(args.data_dir.join("issued.json")),
        JsonFileLedger::new(args.data_dir.join("applied.json")),
    )?;
    Ok(service)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match &args.command {
        Some(Command::VendingKey { serial }) => {
            println!("{}", derive_vending_key(serial).to_base64());
        }
        Some(Command::DecoderKey { serial }) => {
            let service = open_service(&args)?;
            println!("{}", service.decoder_key(serial)?.to_hex());
        }
        Some(Command::Issue { serial, amount }) => {
            let mut service = open_service(&args)?;
            let issued = service
                .issue(serial, *amount)
                .with_context(|| format!("issuing {} for meter {}", amount, serial))?;
            println!("{}", issued.token);
        }
        Some(Command::Redeem { serial, token }) => {
            let mut service = open_service(&args)?;
            let redemption = service
                .redeem(serial, token)
                .with_context(|| format!("redeeming {} on meter {}", token, serial))?;
            println!(
                "✓ Applied {} ({:?}), balance {}",
                redemption.amount,
                redemption.class,
                format_tenths(redemption.credit_balance)
            );
        }
        Some(Command::Balance { serial }) => {
            let service = open_service(&args)?;
            println!("{}", format_tenths(service.balance(serial)?));
        }
        Some(Command::Demo) | None => {
            let config = load_config(args.config.as_deref())?;
            run_demo(config)?;
        }
    }

    Ok(())
}

fn format_tenths(tenths: u64) -> String {
    format!("{}.{}", tenths / 10, tenths % 10)
}

fn run_demo(config: VendingConfig) -> Result<()> {
    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║        STS Prepaid Token Vending - Proof of Concept Demo      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ========== Keys ==========
    println!("🔧 Deriving meter keys...\n");

    let serial: SerialNumber = "45623123133".parse()?;
    let mut service = TokenService::new(config, InMemoryLedger::new(), InMemoryLedger::new())?;

    let control = &service.config().control;
    println!("✓ Meter serial: {}", serial);
    println!("✓ Token identifier: {}", TokenIdentifier::from_serial(&serial));
    println!(
        "✓ Control: key type {}, SGC {:06}, TI {:02}, KRN {}, DRN {}",
        control.key_type,
        control.supply_group_code,
        control.tariff_index,
        control.key_revision_number,
        control.decoder_reference_number
    );
    println!();

    // ========== Issue ==========
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎫 ISSUE: Vendor sells credit to the meter owner");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let mut tokens = Vec::new();
    for amount in ["692.5", "13.8", "1820162.4"] {
        let issued = service.issue(&serial, amount.parse()?)?;
        println!("  {:>10} units  →  {}", issued.amount, issued.token);
        tokens.push(issued.token);
    }
    println!();

    // ========== Redeem ==========
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🔌 REDEEM: Meter owner keys in the tokens");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    for token in &tokens {
        let redemption = service.redeem(&serial, token)?;
        println!(
            "  ✓ {} accepted: +{} (balance {})",
            token,
            redemption.amount,
            format_tenths(redemption.credit_balance)
        );
    }
    println!();

    // ========== Replay ==========
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🚫 REPLAY: Same token entered twice");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    match service.redeem(&serial, &tokens[0]) {
        Err(e) => println!("  ✓ Rejected: {}", e),
        Ok(_) => println!("  ✗ Replay was accepted"),
    }
    println!();

    // ========== Wrong meter ==========
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🚫 WRONG METER: Token keyed into another meter");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let other: SerialNumber = "12345678901".parse()?;
    match service.redeem(&other, &tokens[1]) {
        Err(e) => println!("  ✓ Rejected on {}: {}", other, e),
        Ok(_) => println!("  ✗ Foreign token was accepted"),
    }
    println!();

    println!("📊 Final balance for {}: {}", serial, format_tenths(service.balance(&serial)?));
    Ok(())
}
