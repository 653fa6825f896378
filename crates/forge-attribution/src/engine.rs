//! The attribution engine.
//!
//! For each earning gene with nonzero invocations in a closed period:
//! `share = count / Σ count(active)`, `attributable = share * revenue`,
//! `royalty = attributable * rate(gene, period_end)`. Each distinct
//! ancestor within two derivation hops whose own window is still running
//! earns a flat 0.5% of the descendant's gross attributable revenue,
//! independent of its own direct royalty state.
//!
//! All divisions floor, so rounding dust stays in the period rather than
//! being over-distributed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use forge_core::config::EngineConfig;
use forge_core::constants::{BPS_PRECISION, PPB_PRECISION};
use forge_core::error::AttributionError;
use forge_core::traits::RateCalculator;
use forge_core::types::{ContributorId, GeneId, GeneStatus, Hash256, PeriodId, RevenuePeriod};
use forge_registry::RegistrySnapshot;

/// One gene's direct royalty for a period.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributionLine {
    pub gene: GeneId,
    pub contributor: ContributorId,
    /// This gene's share of period revenue, in embers.
    pub attributable: u64,
    /// Decayed rate at period end, parts-per-billion.
    pub rate_ppb: u64,
    pub royalty: u64,
}

/// One lineage credit: `ancestor` earns on `earning_gene`'s revenue.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineageLine {
    pub earning_gene: GeneId,
    pub ancestor: GeneId,
    pub contributor: ContributorId,
    /// Derivation distance (1 or 2).
    pub depth: u32,
    pub credit: u64,
}

/// The full, replayable result of attributing one period.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PeriodAttribution {
    pub period: PeriodId,
    /// Digest of the registry snapshot this was computed against.
    pub snapshot_digest: Hash256,
    pub direct: Vec<AttributionLine>,
    pub lineage: Vec<LineageLine>,
    /// Absolute per-contributor totals for the period (direct + lineage).
    pub payouts: BTreeMap<ContributorId, u64>,
    pub total_direct: u64,
    pub total_lineage: u64,
}

/// Splits closed periods across active genes and their lineage.
#[derive(Clone, Debug, Default)]
pub struct AttributionEngine {
    config: EngineConfig,
}

impl AttributionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Attribute a closed period against a registry snapshot.
    ///
    /// Pure: identical inputs produce identical output (idempotent
    /// recomputation). Genes are visited in id order and payouts accumulate
    /// in a BTreeMap, so the result is deterministic.
    ///
    /// # Errors
    /// - `PeriodNotClosed` if the period is still open
    /// - `Overrun` if direct + lineage exceed period revenue (fatal — money
    ///   would be double-counted; the period must halt)
    /// - `ArithmeticOverflow` on any checked arithmetic failure
    pub fn attribute(
        &self,
        period: &RevenuePeriod,
        snapshot: &RegistrySnapshot,
        rate: &dyn RateCalculator,
    ) -> Result<PeriodAttribution, AttributionError> {
        if !period.closed {
            return Err(AttributionError::PeriodNotClosed(period.id));
        }
        let revenue = period.total_revenue()?;
        let at = period.ends_at;

        // Denominator: invocations of earning genes only. Suspended,
        // disputed, and expired genes contribute zero and do not dilute
        // earning shares. Superseded genes keep earning at their halved
        // rate until their window ends.
        let total_active: u128 = period
            .invocations
            .iter()
            .filter(|(id, count)| {
                **count > 0 && snapshot.get(id).is_some_and(|g| earns_directly(g.status))
            })
            .map(|(_, count)| *count as u128)
            .sum();

        let mut out = PeriodAttribution {
            period: period.id,
            snapshot_digest: snapshot.digest,
            direct: Vec::new(),
            lineage: Vec::new(),
            payouts: BTreeMap::new(),
            total_direct: 0,
            total_lineage: 0,
        };
        if total_active == 0 {
            debug!(period = %period.id, "no active invocations; empty attribution");
            return Ok(out);
        }

        for (id, count) in &period.invocations {
            if *count == 0 {
                continue;
            }
            let Some(gene) = snapshot.get(id) else { continue };
            if !earns_directly(gene.status) {
                continue;
            }

            let attributable = ((revenue as u128)
                .checked_mul(*count as u128)
                .ok_or(AttributionError::ArithmeticOverflow)?
                / total_active) as u64;
            let rate_ppb = rate.rate_ppb(&gene.rate_view(), at)?;
            let royalty = ((attributable as u128)
                .checked_mul(rate_ppb as u128)
                .ok_or(AttributionError::ArithmeticOverflow)?
                / PPB_PRECISION as u128) as u64;

            out.direct.push(AttributionLine {
                gene: *id,
                contributor: gene.contributor,
                attributable,
                rate_ppb,
                royalty,
            });
            out.total_direct = out
                .total_direct
                .checked_add(royalty)
                .ok_or(AttributionError::ArithmeticOverflow)?;
            credit(&mut out.payouts, gene.contributor, royalty)?;

            self.credit_lineage(&mut out, snapshot, *id, attributable, at)?;
        }

        let distributed = out
            .total_direct
            .checked_add(out.total_lineage)
            .ok_or(AttributionError::ArithmeticOverflow)?;
        if distributed > revenue {
            error!(
                period = %period.id,
                distributed,
                revenue,
                "attribution overrun — halting period"
            );
            return Err(AttributionError::Overrun { computed: distributed, revenue });
        }

        info!(
            period = %period.id,
            direct = out.total_direct,
            lineage = out.total_lineage,
            contributors = out.payouts.len(),
            "period attributed"
        );
        Ok(out)
    }

    /// Replay guard: verify the snapshot digest recorded for a period
    /// before recomputing against it.
    pub fn attribute_replay(
        &self,
        period: &RevenuePeriod,
        snapshot: &RegistrySnapshot,
        recorded_digest: Hash256,
        rate: &dyn RateCalculator,
    ) -> Result<PeriodAttribution, AttributionError> {
        snapshot.verify_digest(recorded_digest)?;
        self.attribute(period, snapshot, rate)
    }

    /// Flat lineage credit to each distinct eligible ancestor within the
    /// depth bound. Eligible: own window still running at period end and
    /// status neither Expired nor Disputed. Superseded and Suspended
    /// ancestors still collect — the credit is independent of their direct
    /// royalty state.
    fn credit_lineage(
        &self,
        out: &mut PeriodAttribution,
        snapshot: &RegistrySnapshot,
        earning: GeneId,
        attributable: u64,
        at: u64,
    ) -> Result<(), AttributionError> {
        // Depth of each ancestor: parents first, then their parents, with
        // the nearer depth winning for diamond-shaped graphs.
        let depth1 = snapshot.ancestors(earning, 1);
        let all = snapshot.ancestors(earning, self.config.lineage_max_depth);

        for ancestor_id in &all {
            let Some(ancestor) = snapshot.get(ancestor_id) else { continue };
            if ancestor.window_expired(at) {
                continue;
            }
            if matches!(ancestor.status, GeneStatus::Expired | GeneStatus::Disputed) {
                continue;
            }
            let credit_amount = ((attributable as u128)
                .checked_mul(self.config.lineage_credit_bps as u128)
                .ok_or(AttributionError::ArithmeticOverflow)?
                / BPS_PRECISION as u128) as u64;
            if credit_amount == 0 {
                continue;
            }
            out.lineage.push(LineageLine {
                earning_gene: earning,
                ancestor: *ancestor_id,
                contributor: ancestor.contributor,
                depth: if depth1.contains(ancestor_id) { 1 } else { 2 },
                credit: credit_amount,
            });
            out.total_lineage = out
                .total_lineage
                .checked_add(credit_amount)
                .ok_or(AttributionError::ArithmeticOverflow)?;
            credit(&mut out.payouts, ancestor.contributor, credit_amount)?;
        }
        Ok(())
    }
}

/// Whether a gene in this status earns direct royalties.
///
/// Superseded genes continue at their halved rate (the replacement
/// discontinuity shrinks the claim, it does not end it); suspension,
/// dispute, and expiry are the gates that zero a period's earnings.
fn earns_directly(status: GeneStatus) -> bool {
    matches!(status, GeneStatus::Active | GeneStatus::Superseded)
}

fn credit(
    payouts: &mut BTreeMap<ContributorId, u64>,
    contributor: ContributorId,
    amount: u64,
) -> Result<(), AttributionError> {
    let entry = payouts.entry(contributor).or_insert(0);
    *entry = entry
        .checked_add(amount)
        .ok_or(AttributionError::ArithmeticOverflow)?;
    Ok(())
}
