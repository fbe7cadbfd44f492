use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use verisettle::application::platform::{Platform, PlatformPorts};
use verisettle::config::EngineConfig;
use verisettle::domain::ids::SellerId;
use verisettle::domain::payout::{PayoutMethod, Period, TransferStatus};
use verisettle::domain::ports::{
    Clock, ClockRef, ExpertReviewStoreRef, OrderLedgerRef, SettlementStoreRef, VerificationStoreRef,
    VerifierPayoutStoreRef,
};
use verisettle::infrastructure::clock::{FixedClock, SystemClock};
use verisettle::infrastructure::in_memory::{
    InMemoryExpertReviewStore, InMemoryOrderLedger, InMemoryProductCatalog,
    InMemorySettlementStore, InMemoryVerificationStore, InMemoryVerifierPayoutStore,
    InMemoryVerifierRegistry, StaticPayeeDirectory,
};
use verisettle::infrastructure::notifier::TracingNotifier;
use verisettle::infrastructure::provider::SimulatedPaymentProvider;
use verisettle::interfaces::csv::order_reader::{LedgerEntry, OrderReader};
use verisettle::interfaces::csv::report_writer::ReportWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true, env = "VERISETTLE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level. `RUST_LOG` wins over both.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the verification fee table and its platform/verifier split.
    Fees,
    /// Import an order export and settle sellers over a closed period.
    Settle {
        /// Orders CSV file
        input: PathBuf,
        /// First day of the period (inclusive)
        #[arg(long)]
        from: NaiveDate,
        /// Last day of the period (inclusive)
        #[arg(long)]
        to: NaiveDate,
        /// Settle only this seller
        #[arg(long)]
        seller: Option<u64>,
        /// Submit a bank transfer for every new settlement
        #[arg(long)]
        payout: bool,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Month-to-date estimate for one seller; nothing is stored.
    Estimate {
        /// Orders CSV file
        input: PathBuf,
        #[arg(long)]
        seller: u64,
        /// Evaluate as of this day instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Apply a payment provider callback to a stored payout.
    Callback {
        /// Transaction reference the payout was submitted with
        reference: String,
        /// Failure reason; the transfer is treated as succeeded when omitted
        #[arg(long)]
        failed: Option<String>,
        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[derive(Args)]
struct StorageArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

/// Store handles shared by the platform and the CLI's own import step.
struct Stores {
    verifications: VerificationStoreRef,
    expert_reviews: ExpertReviewStoreRef,
    settlements: SettlementStoreRef,
    orders: OrderLedgerRef,
    verifier_payouts: VerifierPayoutStoreRef,
}

impl Stores {
    fn in_memory() -> Self {
        Self {
            verifications: Arc::new(InMemoryVerificationStore::new()),
            expert_reviews: Arc::new(InMemoryExpertReviewStore::new()),
            settlements: Arc::new(InMemorySettlementStore::new()),
            orders: Arc::new(InMemoryOrderLedger::new()),
            verifier_payouts: Arc::new(InMemoryVerifierPayoutStore::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        use verisettle::infrastructure::rocksdb::RocksDbStore;

        let Some(path) = db_path else {
            return Ok(Self::in_memory());
        };
        let store = RocksDbStore::open(path).into_diagnostic()?;
        Ok(Self {
            verifications: Arc::new(store.clone()),
            expert_reviews: Arc::new(store.clone()),
            settlements: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            verifier_payouts: Arc::new(store),
        })
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        if db_path.is_some() {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
        Ok(Self::in_memory())
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path).into_diagnostic(),
        None => Ok(EngineConfig::default()),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();
}

fn build_platform(config: &EngineConfig, stores: &Stores, clock: ClockRef) -> Platform {
    let payees = StaticPayeeDirectory::from_entries(
        config
            .payees
            .iter()
            .map(|entry| (entry.payee, entry.destination.clone())),
    );
    let ports = PlatformPorts {
        verifications: stores.verifications.clone(),
        expert_reviews: stores.expert_reviews.clone(),
        settlements: stores.settlements.clone(),
        orders: stores.orders.clone(),
        verifier_payouts: stores.verifier_payouts.clone(),
        catalog: Arc::new(InMemoryProductCatalog::new()),
        registry: Arc::new(InMemoryVerifierRegistry::new()),
        payees: Arc::new(payees),
        provider: Arc::new(SimulatedPaymentProvider::new()),
        notifications: Arc::new(TracingNotifier),
        clock,
    };
    Platform::new(config, ports)
}

/// Streams the order export into the ledger, reporting bad rows on stderr.
async fn import_orders(path: &Path, config: &EngineConfig, orders: &OrderLedgerRef) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let reader = OrderReader::new(file, config.currency, config.order_commission_bps);
    for entry in reader.entries() {
        let recorded = match entry {
            Ok(LedgerEntry::Sale(order)) => orders.record_order(order).await,
            Ok(LedgerEntry::Refund(refund)) => orders.record_refund(refund).await,
            Err(e) => {
                eprintln!("Error reading order: {}", e);
                continue;
            }
        };
        if let Err(e) = recorded {
            eprintln!("Error recording order: {}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());

    match cli.command {
        Command::Fees => {
            writer.write_fee_table(&config.fees).into_diagnostic()?;
        }
        Command::Settle {
            input,
            from,
            to,
            seller,
            payout,
            storage,
        } => {
            let stores = Stores::open(storage.db_path.as_deref())?;
            let platform = build_platform(&config, &stores, Arc::new(SystemClock));
            import_orders(&input, &config, &stores.orders).await?;

            let sellers = match seller {
                Some(id) => vec![SellerId(id)],
                None => stores.orders.sellers().await.into_diagnostic()?,
            };

            let mut settled = Vec::new();
            for seller in sellers {
                match platform.settlement.calculate_settlement(seller, from, to).await {
                    Ok(outcome) => settled.push(platform.events.publish(outcome).await),
                    Err(e) => eprintln!("Error settling seller {}: {}", seller, e),
                }
            }

            if payout {
                for settlement in settled.iter_mut() {
                    match platform
                        .settlement
                        .process_settlement_payout(settlement.id, PayoutMethod::BankTransfer)
                        .await
                    {
                        Ok(outcome) => *settlement = platform.events.publish(outcome).await,
                        Err(e) => eprintln!("Error paying settlement {}: {}", settlement.id, e),
                    }
                }
            }

            writer.write_settlements(&settled).into_diagnostic()?;
        }
        Command::Estimate {
            input,
            seller,
            as_of,
        } => {
            let clock: ClockRef = match as_of {
                Some(day) => Arc::new(FixedClock::new(day.and_time(NaiveTime::MIN).and_utc())),
                None => Arc::new(SystemClock),
            };
            let stores = Stores::in_memory();
            let platform = build_platform(&config, &stores, clock.clone());
            import_orders(&input, &config, &stores.orders).await?;

            let seller = SellerId(seller);
            let totals = platform
                .settlement
                .get_current_month_estimate(seller)
                .await
                .into_diagnostic()?;
            let period = Period::month_to_date(clock.now().date_naive());
            writer
                .write_estimate(seller, &totals, &period)
                .into_diagnostic()?;
        }
        Command::Callback {
            reference,
            failed,
            storage,
        } => {
            let stores = Stores::open(storage.db_path.as_deref())?;
            let platform = build_platform(&config, &stores, Arc::new(SystemClock));
            let status = match failed {
                Some(reason) => TransferStatus::Failed { reason },
                None => TransferStatus::Succeeded { paid_at: Utc::now() },
            };
            let outcome = platform
                .apply_transfer_status(&reference, status)
                .await
                .into_diagnostic()?;
            let target = platform.events.publish(outcome).await;
            eprintln!("Applied transfer status to {:?}", target);
        }
    }

    Ok(())
}
