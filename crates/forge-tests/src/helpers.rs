//! Shared test helpers for the Forge integration suite.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use forge_core::config::EngineConfig;
use forge_core::error::PayoutError;
use forge_core::traits::{Authorizer, TreasuryHandoff};
use forge_core::types::{
    ArtifactId, ContributorId, DisbursementRecord, GeneId, HarnessVerdict, Hash256,
    InvariantGrant, PeriodId, RequestId, RevenuePeriod, Tier,
};
use forge_registry::{Admission, AdmissionRequest, GeneRegistry, TierClassifier};

/// Opt-in log output for debugging a failing integration run
/// (`RUST_LOG=debug cargo test ...`). Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Simple 32-byte id from a seed byte.
pub fn h(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

pub fn contributor(seed: u8) -> ContributorId {
    ContributorId(h(seed))
}

/// Authorizer that approves every request (the external capability is out
/// of scope for these tests; classifier-level denial is covered in
/// forge-registry's unit tests).
pub struct ApproveAll;

impl Authorizer for ApproveAll {
    fn authorize(&self, _artifact: &ArtifactId, _target: Tier) -> bool {
        true
    }
}

/// Treasury stub that accepts everything with sequential request ids.
#[derive(Default)]
pub struct AcceptAllTreasury {
    next: AtomicU64,
}

impl TreasuryHandoff for AcceptAllTreasury {
    fn submit(&self, _record: &DisbursementRecord) -> Result<RequestId, PayoutError> {
        Ok(RequestId(self.next.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// A fully-passing harness verdict for an artifact seed.
pub fn passing_verdict(artifact_seed: u8, at: u64) -> HarnessVerdict {
    HarnessVerdict {
        candidate: ArtifactId(h(artifact_seed)),
        harness_passed: true,
        extraction_passed: true,
        artifact_registered: true,
        production_integrated: false,
        at,
    }
}

/// Admit a gene at `tier` through the classifier.
pub fn admit(
    registry: &GeneRegistry,
    classifier: &TierClassifier,
    artifact_seed: u8,
    contributor_seed: u8,
    tier: Tier,
    parents: &[GeneId],
    at: u64,
) -> Admission {
    let request = AdmissionRequest {
        verdict: passing_verdict(artifact_seed, at),
        target: tier,
        contributor: contributor(contributor_seed),
        parent_ids: parents.iter().copied().collect::<BTreeSet<_>>(),
        grant: InvariantGrant::Stream,
        flat_payment: None,
    };
    classifier.admit(registry, request).unwrap()
}

/// A closed single-category period.
pub fn closed_period(
    id: u64,
    ends_at: u64,
    revenue: u64,
    invocations: &[(GeneId, u64)],
) -> RevenuePeriod {
    let mut revenue_by_category = BTreeMap::new();
    revenue_by_category.insert("api".to_string(), revenue);
    RevenuePeriod {
        id: PeriodId(id),
        starts_at: ends_at.saturating_sub(forge_core::constants::MONTH_SECS),
        ends_at,
        revenue_by_category,
        invocations: invocations.iter().copied().collect(),
        closed: true,
    }
}

/// The full engine stack wired together with permissive externals.
pub struct Stack {
    pub registry: GeneRegistry,
    pub classifier: TierClassifier,
    pub engine: forge_attribution::AttributionEngine,
    pub calculator: forge_decay::RoyaltyRate,
    pub scheduler: forge_payout::PayoutScheduler,
    pub config: EngineConfig,
}

impl Stack {
    pub fn new() -> Self {
        init_tracing();
        let config = EngineConfig::default();
        Self {
            registry: GeneRegistry::new(),
            classifier: TierClassifier::new(Arc::new(ApproveAll)),
            engine: forge_attribution::AttributionEngine::new(config.clone()),
            calculator: forge_decay::RoyaltyRate::new(),
            scheduler: forge_payout::PayoutScheduler::new(
                config.clone(),
                Arc::new(AcceptAllTreasury::default()),
            ),
            config,
        }
    }

    /// Run one period end-to-end: usage transitions, expiry sweep,
    /// snapshot, attribution, settlement.
    pub fn run_period(&self, period: &RevenuePeriod) -> forge_attribution::PeriodAttribution {
        self.registry.apply_usage(period, &self.config);
        self.registry.expire_due(period.ends_at);
        let snapshot = self.registry.snapshot(period.ends_at);
        let attribution = self
            .engine
            .attribute(period, &snapshot, &self.calculator)
            .unwrap();
        self.scheduler.settle(&attribution, period.ends_at).unwrap();
        attribution
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
