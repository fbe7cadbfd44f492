#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use verisettle::application::platform::{Platform, PlatformPorts};
use verisettle::config::EngineConfig;
use verisettle::domain::fee::VerificationLevel;
use verisettle::domain::ids::{ProductId, SellerId, VerifierId};
use verisettle::domain::panel::Discipline;
use verisettle::domain::payout::{Payee, PayoutDestination};
use verisettle::domain::ports::{ArtifactSummary, ProductInfo, VerifierProfile};
use verisettle::domain::verification::{
    FunctionalReport, Recommendation, ReviewReport, ReviewSubmission, SecurityReport,
};
use verisettle::infrastructure::clock::FixedClock;
use verisettle::infrastructure::in_memory::{
    InMemoryExpertReviewStore, InMemoryOrderLedger, InMemoryProductCatalog,
    InMemorySettlementStore, InMemoryVerificationStore, InMemoryVerifierPayoutStore,
    InMemoryVerifierRegistry, RecordingNotifier, StaticPayeeDirectory,
};
use verisettle::infrastructure::provider::SimulatedPaymentProvider;

pub const SELLER: SellerId = SellerId(1);
pub const PRODUCT: ProductId = ProductId(100);
/// May lead any level.
pub const LEAD: VerifierId = VerifierId(10);
/// May lead level 1 only.
pub const JUNIOR: VerifierId = VerifierId(11);

/// One expert per discipline, in `Discipline::ALL` order.
pub fn expert_for(discipline: Discipline) -> VerifierId {
    match discipline {
        Discipline::Design => VerifierId(20),
        Discipline::Planning => VerifierId(21),
        Discipline::Development => VerifierId(22),
        Discipline::Domain => VerifierId(23),
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
}

pub fn destination(holder: &str) -> PayoutDestination {
    PayoutDestination {
        holder_name: Some(holder.to_string()),
        account_number: Some("0012345678".to_string()),
        institution: Some("First Bank".to_string()),
    }
}

/// A platform over in-memory adapters, with handles kept for inspection.
pub struct Harness {
    pub platform: Platform,
    pub catalog: InMemoryProductCatalog,
    pub registry: InMemoryVerifierRegistry,
    pub payees: StaticPayeeDirectory,
    pub provider: SimulatedPaymentProvider,
    pub notifier: RecordingNotifier,
    pub orders: InMemoryOrderLedger,
    pub clock: FixedClock,
}

pub async fn harness() -> Harness {
    let config = EngineConfig::default();
    let catalog = InMemoryProductCatalog::new();
    let registry = InMemoryVerifierRegistry::new();
    let payees = StaticPayeeDirectory::new();
    let provider = SimulatedPaymentProvider::new();
    let notifier = RecordingNotifier::new();
    let orders = InMemoryOrderLedger::new();
    let clock = FixedClock::new(at(5, 9));

    catalog
        .insert(ProductInfo {
            id: PRODUCT,
            seller: SELLER,
            title: "Invoice parser agent".to_string(),
            artifact: ArtifactSummary {
                file_name: Some("agent.zip".to_string()),
                size_bytes: 4_096,
                description: "Parses PDF invoices into structured JSON".to_string(),
            },
        })
        .await;

    registry
        .insert(VerifierProfile {
            id: LEAD,
            active: true,
            max_level: VerificationLevel::EXPERT,
            disciplines: BTreeSet::new(),
        })
        .await;
    registry
        .insert(VerifierProfile {
            id: JUNIOR,
            active: true,
            max_level: VerificationLevel::FUNCTIONAL,
            disciplines: BTreeSet::new(),
        })
        .await;
    for discipline in Discipline::ALL {
        registry
            .insert(VerifierProfile {
                id: expert_for(discipline),
                active: true,
                max_level: VerificationLevel::BASIC,
                disciplines: BTreeSet::from([discipline]),
            })
            .await;
    }

    let ports = PlatformPorts {
        verifications: Arc::new(InMemoryVerificationStore::new()),
        expert_reviews: Arc::new(InMemoryExpertReviewStore::new()),
        settlements: Arc::new(InMemorySettlementStore::new()),
        orders: Arc::new(orders.clone()),
        verifier_payouts: Arc::new(InMemoryVerifierPayoutStore::new()),
        catalog: Arc::new(catalog.clone()),
        registry: Arc::new(registry.clone()),
        payees: Arc::new(payees.clone()),
        provider: Arc::new(provider.clone()),
        notifications: Arc::new(notifier.clone()),
        clock: Arc::new(clock.clone()),
    };

    Harness {
        platform: Platform::new(&config, ports),
        catalog,
        registry,
        payees,
        provider,
        notifier,
        orders,
        clock,
    }
}

impl Harness {
    pub async fn register_payee(&self, payee: Payee, holder: &str) {
        self.payees.insert(payee, destination(holder)).await;
    }
}

pub fn functional_report() -> FunctionalReport {
    FunctionalReport {
        runs_as_described: true,
        documentation_complete: true,
        tested_environments: vec!["linux".to_string(), "macos".to_string()],
    }
}

pub fn approve(score: u8, report: ReviewReport) -> ReviewSubmission {
    ReviewSubmission {
        score,
        recommendation: Recommendation::Approve,
        comments: "works as advertised".to_string(),
        report,
    }
}

pub fn security_report() -> ReviewReport {
    ReviewReport::Security(SecurityReport {
        functional: functional_report(),
        credentials_handled_safely: true,
        external_endpoints: Vec::new(),
        vulnerabilities: Vec::new(),
    })
}

/// Writes an order export with `rows` random sales spread over January 2026.
pub fn generate_orders_csv(path: &Path, rows: usize, sellers: u64) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    let mut rng = rand::thread_rng();

    wtr.write_record(["type", "order", "seller", "amount", "fee", "status", "date"])?;
    for order in 1..=rows {
        let cents: u32 = rng.gen_range(100..=50_000);
        let day: u32 = rng.gen_range(1..=31);
        wtr.write_record([
            "sale",
            &order.to_string(),
            &rng.gen_range(1..=sellers).to_string(),
            &format!("{}.{:02}", cents / 100, cents % 100),
            "",
            "completed",
            &format!("2026-01-{day:02}"),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
