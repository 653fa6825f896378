//! Error types for the Forge engine.
use thiserror::Error;

use crate::types::{GeneId, Hash256, PeriodId, RequestId, Tier};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown gene: {0}")] UnknownGene(GeneId),
    #[error("unknown parent: {0}")] UnknownParent(GeneId),
    #[error("edge {child} -> {parent} would create a cycle")] CycleDetected { child: GeneId, parent: GeneId },
    #[error("gene {id} is {status}, expected Active")] NotActive { id: GeneId, status: String },
    #[error("invalid status transition for {id}: {from} -> {to}")] InvalidTransition { id: GeneId, from: String, to: String },
    #[error("gene already registered: {0}")] DuplicateGene(GeneId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    #[error("verdict does not meet {target:?} threshold")] IneligibleVerdict { target: Tier },
    #[error("{target:?} requires external authorization")] RequiresAuthorization { target: Tier },
    #[error("artifact {0} already backs a registered gene")] AlreadyClassified(Hash256),
    #[error("gene {0} is not under dispute")] NotDisputed(GeneId),
    #[error("registry: {0}")] Registry(#[from] RegistryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("supersession at {at} precedes window start {start}")] EventBeforeWindow { at: u64, start: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributionError {
    #[error("period {0} is not closed")] PeriodNotClosed(PeriodId),
    #[error("attribution overrun: computed {computed} exceeds period revenue {revenue}")] Overrun { computed: u64, revenue: u64 },
    #[error("stale period replay: snapshot {actual} does not match recorded {expected}")] StalePeriodReplay { expected: Hash256, actual: Hash256 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("rate: {0}")] Rate(#[from] RateError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("unknown treasury request: {0}")] UnknownRequest(RequestId),
    #[error("treasury submit failed: {0}")] SubmitFailed(String),
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

/// Umbrella error for callers driving the whole pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForgeError {
    #[error("registry: {0}")] Registry(#[from] RegistryError),
    #[error("tier: {0}")] Tier(#[from] TierError),
    #[error("rate: {0}")] Rate(#[from] RateError),
    #[error("attribution: {0}")] Attribution(#[from] AttributionError),
    #[error("payout: {0}")] Payout(#[from] PayoutError),
}
