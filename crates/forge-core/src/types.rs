//! Core data model: genes, tiers, revenue periods, disbursements.
//!
//! All monetary values are in embers (1 TOKEN = 10^8 embers).
//! All timestamps are u64 unix seconds per engine convention.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    bps_to_ppb, FLAME_DURATION_MONTHS, FLAME_END_BPS, FLAME_START_BPS,
    FURNACE_DURATION_MONTHS, FURNACE_END_BPS, FURNACE_INTEGRATED_DURATION_MONTHS,
    FURNACE_START_BPS, INVARIANT_DURATION_MONTHS, INVARIANT_END_BPS, INVARIANT_START_BPS,
    MONTH_SECS,
};
use crate::error::AttributionError;

/// A 32-byte hash value.
///
/// Used for gene ids, contributor ids, artifact ids, and registry snapshot
/// digests (all BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! hash_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
            Default, bincode::Encode, bincode::Decode,
        )]
        pub struct $name(pub Hash256);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Hash256> for $name {
            fn from(h: Hash256) -> Self {
                Self(h)
            }
        }
    };
}

hash_newtype! {
    /// Identifier of a registered gene.
    GeneId
}
hash_newtype! {
    /// Identifier of a contributor account.
    ContributorId
}
hash_newtype! {
    /// Identifier of the source artifact a gene was accepted from.
    ArtifactId
}

impl GeneId {
    /// Derive a gene id from its source artifact and contributor.
    ///
    /// BLAKE3 over the concatenated id bytes, so registration is
    /// deterministic and the same submission cannot mint two genes.
    pub fn derive(artifact: &ArtifactId, contributor: &ContributorId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(artifact.0.as_bytes());
        hasher.update(contributor.0.as_bytes());
        Self(Hash256(hasher.finalize().into()))
    }
}

/// Identifier of a closed revenue/billing period.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct PeriodId(pub u64);

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period-{}", self.0)
    }
}

/// Identifier of an in-flight treasury disbursement request.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Entitlement tier of a gene, ordered from lowest to highest.
///
/// There is no `None` variant: a candidate without a tier has no gene.
/// Tiers are monotonically non-decreasing over a gene's life except via an
/// explicit dispute override.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub enum Tier {
    /// Flat one-time payment only; no royalty stream.
    Spark,
    /// 2% -> 0% over 6 months.
    Flame,
    /// 5% -> 1% over 12 months (18 when production-integrated).
    FurnaceForged,
    /// 8% -> 2% over 24 months, or a one-time buyout. External designation only.
    Invariant,
}

impl Tier {
    /// The rate window for this tier.
    ///
    /// `production_integrated` extends the FurnaceForged window from 12 to
    /// 18 months; it has no effect on other tiers.
    pub fn params(&self, production_integrated: bool) -> TierParams {
        match self {
            Self::Spark => TierParams { start_bps: 0, end_bps: 0, duration_months: 0 },
            Self::Flame => TierParams {
                start_bps: FLAME_START_BPS,
                end_bps: FLAME_END_BPS,
                duration_months: FLAME_DURATION_MONTHS,
            },
            Self::FurnaceForged => TierParams {
                start_bps: FURNACE_START_BPS,
                end_bps: FURNACE_END_BPS,
                duration_months: if production_integrated {
                    FURNACE_INTEGRATED_DURATION_MONTHS
                } else {
                    FURNACE_DURATION_MONTHS
                },
            },
            Self::Invariant => TierParams {
                start_bps: INVARIANT_START_BPS,
                end_bps: INVARIANT_END_BPS,
                duration_months: INVARIANT_DURATION_MONTHS,
            },
        }
    }

    /// Whether assignment to this tier needs an authorizing confirmation.
    pub fn requires_authorization(&self) -> bool {
        matches!(self, Self::FurnaceForged | Self::Invariant)
    }
}

/// A gene's royalty rate window, fixed at tier assignment.
///
/// The window is never extended afterward — supersession halves the in-effect
/// rate but keeps the same end rate and end date.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TierParams {
    /// Rate at the start of the window, in basis points.
    pub start_bps: u64,
    /// Rate at the end of the window, in basis points.
    pub end_bps: u64,
    /// Window length in 30-day months. Zero means no royalty stream.
    pub duration_months: u64,
}

impl TierParams {
    /// Window length in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_months * MONTH_SECS
    }

    /// Start rate in parts-per-billion.
    pub fn start_ppb(&self) -> u64 {
        bps_to_ppb(self.start_bps)
    }

    /// End rate in parts-per-billion.
    pub fn end_ppb(&self) -> u64 {
        bps_to_ppb(self.end_bps)
    }
}

/// Lifecycle status of a gene.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum GeneStatus {
    /// Earning, eligible for direct attribution.
    Active,
    /// Replaced by a newer gene; rate halved, window unchanged.
    Superseded,
    /// No invocations for the suspension window; earns zero, clock runs.
    Suspended,
    /// Under external dispute; payout accrual halted, clock runs.
    Disputed,
    /// Royalty window over. Terminal.
    Expired,
}

impl GeneStatus {
    /// Whether the transition `self -> next` is permitted.
    ///
    /// Expired is terminal. Disputed is reachable from any live status and
    /// resolvable back to any status (the resolving authority decides).
    pub fn can_transition_to(&self, next: GeneStatus) -> bool {
        use GeneStatus::*;
        if *self == next {
            return false;
        }
        match self {
            Active => matches!(next, Superseded | Suspended | Expired | Disputed),
            Suspended => matches!(next, Active | Expired | Disputed),
            Superseded => matches!(next, Expired | Disputed),
            Disputed => matches!(next, Active | Suspended | Superseded | Expired),
            Expired => false,
        }
    }
}

impl fmt::Display for GeneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "Active",
            Self::Superseded => "Superseded",
            Self::Suspended => "Suspended",
            Self::Disputed => "Disputed",
            Self::Expired => "Expired",
        };
        f.write_str(s)
    }
}

/// A replacement event recorded on the gene being superseded.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SupersessionEvent {
    /// When the replacement took effect.
    pub at: u64,
    /// The gene designated as the replacement.
    pub by: GeneId,
}

/// Append-only audit event on a gene.
///
/// The registry records every mutation here; current status and rate are
/// always recomputable from this log, which is what makes period replay
/// and idempotent recomputation possible.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum GeneEvent {
    Registered { at: u64 },
    TierAssigned { at: u64, tier: Tier },
    Superseded { at: u64, by: GeneId },
    Suspended { at: u64 },
    Resumed { at: u64 },
    DisputeOpened { at: u64, authority: ContributorId, reason: String },
    DisputeResolved { at: u64, authority: ContributorId, tier: Tier, reason: String },
    Expired { at: u64 },
}

/// A registered, revenue-eligible unit of accepted work.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Gene {
    pub id: GeneId,
    pub contributor: ContributorId,
    pub source_artifact: ArtifactId,
    /// Derivation parents; empty means novel work.
    pub parent_ids: BTreeSet<GeneId>,
    /// Populated only via supersession events.
    pub child_ids: BTreeSet<GeneId>,
    pub tier: Tier,
    pub tier_assigned_at: u64,
    /// Rate window, fixed at tier assignment.
    pub params: TierParams,
    pub status: GeneStatus,
    pub production_integrated: bool,
    /// Last period end with nonzero invocation count.
    pub last_active_at: Option<u64>,
    /// Replacement events, in order of occurrence.
    pub supersessions: Vec<SupersessionEvent>,
    /// Append-only audit log.
    pub events: Vec<GeneEvent>,
}

impl Gene {
    /// End of the royalty window (`tier_assigned_at + duration`).
    pub fn window_end(&self) -> u64 {
        self.tier_assigned_at.saturating_add(self.params.duration_secs())
    }

    /// Whether the royalty window is over at `at`.
    pub fn window_expired(&self, at: u64) -> bool {
        self.params.duration_months == 0 || at >= self.window_end()
    }

    /// Minimal view of this gene for the rate calculator.
    pub fn rate_view(&self) -> RateView {
        RateView {
            start_ppb: self.params.start_ppb(),
            end_ppb: self.params.end_ppb(),
            assigned_at: self.tier_assigned_at,
            window_end: self.window_end(),
            supersession_times: self.supersessions.iter().map(|e| e.at).collect(),
        }
    }
}

/// The slice of gene state the rate calculator needs.
///
/// Status is deliberately absent: suspension and dispute affect eligibility,
/// not the rate, and the decay clock never pauses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateView {
    pub start_ppb: u64,
    pub end_ppb: u64,
    pub assigned_at: u64,
    pub window_end: u64,
    /// Supersession timestamps in ascending order.
    pub supersession_times: Vec<u64>,
}

/// Verdict message from the external testing harness (consumed synchronously
/// at tier-assignment time).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarnessVerdict {
    pub candidate: ArtifactId,
    /// Passed the base adversarial harness.
    pub harness_passed: bool,
    /// Passed extraction (Flame threshold).
    pub extraction_passed: bool,
    /// Artifact registered (FurnaceForged threshold).
    pub artifact_registered: bool,
    pub production_integrated: bool,
    pub at: u64,
}

/// How an Invariant designation is compensated.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantGrant {
    /// The normal 24-month decaying royalty stream.
    Stream,
    /// One-time buyout in embers, exclusive of the stream: the gene's rate
    /// window is zero-duration and the amount is credited once.
    Buyout(u64),
}

/// A closed billing window: revenue by category plus invocation counts.
///
/// Produced by the external revenue feed. Immutable once `closed`; the
/// attribution engine refuses open periods.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RevenuePeriod {
    pub id: PeriodId,
    pub starts_at: u64,
    pub ends_at: u64,
    pub revenue_by_category: BTreeMap<String, u64>,
    pub invocations: BTreeMap<GeneId, u64>,
    pub closed: bool,
}

impl RevenuePeriod {
    /// Total attributable revenue across all categories.
    ///
    /// # Errors
    /// `AttributionError::ArithmeticOverflow` if the category sum overflows.
    pub fn total_revenue(&self) -> Result<u64, AttributionError> {
        self.revenue_by_category
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            .ok_or(AttributionError::ArithmeticOverflow)
    }

    /// Total invocation count across all genes.
    pub fn total_invocations(&self) -> u128 {
        self.invocations.values().map(|c| *c as u128).sum()
    }

    /// Invocation count for one gene (0 if absent).
    pub fn invocations_of(&self, id: &GeneId) -> u64 {
        self.invocations.get(id).copied().unwrap_or(0)
    }
}

/// A contributor's running balances. Mutated only by the payout scheduler.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ContributorAccount {
    pub id: ContributorId,
    /// Rolled-over amount below the payout threshold, in embers.
    pub pending_balance: u64,
    /// Total net amount ever disbursed, in embers.
    pub lifetime_earned: u64,
}

/// Terminal-ish status of a disbursement request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisbursementStatus {
    /// Pushed to treasury; awaiting asynchronous confirmation.
    Submitted,
    Confirmed,
    /// Treasury rejected; the gross amount returned to the pending balance.
    Rejected,
    /// No confirmation within the 14-day window; reported, not retried.
    Overdue,
}

/// Instruction emitted to the external treasury. Append-only once emitted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DisbursementRecord {
    pub contributor: ContributorId,
    pub period: PeriodId,
    /// Pre-burn total in embers.
    pub gross: u64,
    /// 5% burn taken at payment time.
    pub burn: u64,
    /// `gross - burn`, the amount actually transferred.
    pub net: u64,
    pub status: DisbursementStatus,
    /// When the request was handed to treasury.
    pub requested_at: u64,
}
