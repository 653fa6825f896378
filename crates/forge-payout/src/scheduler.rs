//! The payout scheduler.
//!
//! Per contributor and period: gross = period payout + rolled-over balance;
//! a flat 5% burn comes off the gross; a `DisbursementRecord` is emitted
//! only when the net clears 100 token-units, otherwise the full gross rolls
//! forward untouched — the burn is taken once, when an amount is finally
//! paid. Treasury handoff is fire-and-forget: `submit` returns a request id
//! and confirmation or rejection arrives later through [`confirm`] /
//! [`reject`]. Requests unconfirmed 14 days after handoff are reported as
//! overdue, never silently retried forever.
//!
//! [`confirm`]: PayoutScheduler::confirm
//! [`reject`]: PayoutScheduler::reject

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use forge_attribution::PeriodAttribution;
use forge_core::config::EngineConfig;
use forge_core::constants::BPS_PRECISION;
use forge_core::error::PayoutError;
use forge_core::traits::TreasuryHandoff;
use forge_core::types::{
    ContributorAccount, ContributorId, DisbursementRecord, DisbursementStatus, PeriodId,
    RequestId,
};

/// A submitted disbursement awaiting asynchronous treasury confirmation.
#[derive(Clone, Copy, Debug)]
struct Inflight {
    record_index: usize,
    contributor: ContributorId,
    /// Confirmation deadline (submission time + confirmation window).
    deadline: u64,
}

#[derive(Default)]
struct SchedulerState {
    /// Attribution payouts per settled period. Resettling a period
    /// overwrites its entry — the absolute-target source of truth.
    settled: BTreeMap<PeriodId, BTreeMap<ContributorId, u64>>,
    /// One-time credits (Spark flat payments, Invariant buyouts).
    credits: BTreeMap<ContributorId, u64>,
    /// Append-only once emitted; only `status` moves, and only along
    /// Submitted -> Confirmed | Rejected | Overdue.
    records: Vec<DisbursementRecord>,
    /// Net lifetime disbursements per contributor.
    lifetime: BTreeMap<ContributorId, u64>,
}

impl SchedulerState {
    /// Absolute pending balance: everything ever settled or credited,
    /// minus the gross of every non-rejected disbursement. A rejected
    /// record's funds return by exclusion, ready for the next pass.
    fn pending_of(&self, contributor: &ContributorId) -> u64 {
        let settled: u64 = self
            .settled
            .values()
            .filter_map(|payouts| payouts.get(contributor))
            .sum();
        let credited = self.credits.get(contributor).copied().unwrap_or(0);
        let disbursed: u64 = self
            .records
            .iter()
            .filter(|r| r.contributor == *contributor && r.status != DisbursementStatus::Rejected)
            .map(|r| r.gross)
            .sum();
        settled.saturating_add(credited).saturating_sub(disbursed)
    }

    /// Every contributor with settlement history, in id order.
    fn contributors(&self) -> Vec<ContributorId> {
        let mut ids: std::collections::BTreeSet<ContributorId> = self
            .settled
            .values()
            .flat_map(|payouts| payouts.keys().copied())
            .collect();
        ids.extend(self.credits.keys().copied());
        ids.into_iter().collect()
    }
}

/// Aggregates attribution output into treasury disbursement requests.
pub struct PayoutScheduler {
    config: EngineConfig,
    treasury: Arc<dyn TreasuryHandoff>,
    state: RwLock<SchedulerState>,
    inflight: DashMap<RequestId, Inflight>,
}

impl PayoutScheduler {
    pub fn new(config: EngineConfig, treasury: Arc<dyn TreasuryHandoff>) -> Self {
        Self {
            config,
            treasury,
            state: RwLock::new(SchedulerState::default()),
            inflight: DashMap::new(),
        }
    }

    /// Settle a period's attribution and disburse whatever now clears the
    /// threshold.
    ///
    /// Idempotent: resettling with an unchanged attribution emits nothing
    /// new; resettling with corrected figures disburses only the difference
    /// against what was already paid out.
    ///
    /// # Errors
    /// `PayoutError::ArithmeticOverflow` on burn arithmetic failure. A
    /// treasury submit failure is logged and the amount stays pending; it
    /// does not fail the pass.
    pub fn settle(
        &self,
        attribution: &PeriodAttribution,
        now: u64,
    ) -> Result<Vec<DisbursementRecord>, PayoutError> {
        {
            let mut state = self.state.write();
            let replaced = state
                .settled
                .insert(attribution.period, attribution.payouts.clone());
            if let Some(prev) = replaced {
                if prev != attribution.payouts {
                    info!(period = %attribution.period, "period resettled with corrected attribution");
                }
            }
        }
        self.disburse(attribution.period, now)
    }

    /// Record a one-time credit (Spark flat payment or Invariant buyout).
    /// The amount flows through the same threshold and burn machinery on
    /// the next settlement pass.
    pub fn credit_one_time(&self, contributor: ContributorId, amount: u64) {
        let mut state = self.state.write();
        let entry = state.credits.entry(contributor).or_insert(0);
        *entry = entry.saturating_add(amount);
        info!(%contributor, amount, "one-time credit recorded");
    }

    /// Disbursement pass for a period: emit a record for every contributor
    /// whose pending balance clears the threshold after burn. Also the
    /// retry path after a rejection.
    pub fn disburse(
        &self,
        period: PeriodId,
        now: u64,
    ) -> Result<Vec<DisbursementRecord>, PayoutError> {
        let mut emitted = Vec::new();
        let contributors = self.state.read().contributors();

        for contributor in contributors {
            let gross = self.state.read().pending_of(&contributor);
            if gross == 0 {
                continue;
            }
            let burn = gross
                .checked_mul(self.config.burn_bps)
                .ok_or(PayoutError::ArithmeticOverflow)?
                / BPS_PRECISION;
            let net = gross - burn;
            if net < self.config.min_payout {
                // Rolls forward untouched; no burn on rolled-over amounts
                // until they are finally paid.
                continue;
            }

            let record = DisbursementRecord {
                contributor,
                period,
                gross,
                burn,
                net,
                status: DisbursementStatus::Submitted,
                requested_at: now,
            };
            match self.treasury.submit(&record) {
                Ok(request_id) => {
                    let mut state = self.state.write();
                    let record_index = state.records.len();
                    state.records.push(record.clone());
                    let lifetime = state.lifetime.entry(contributor).or_insert(0);
                    *lifetime = lifetime.saturating_add(net);
                    self.inflight.insert(
                        request_id,
                        Inflight {
                            record_index,
                            contributor,
                            deadline: now + self.config.confirm_window_secs,
                        },
                    );
                    info!(%contributor, %period, gross, net, %request_id, "disbursement submitted");
                    emitted.push(record);
                }
                Err(err) => {
                    // The amount stays pending; retried next pass.
                    warn!(%contributor, %period, gross, %err, "treasury submit failed");
                }
            }
        }
        Ok(emitted)
    }

    /// Treasury confirmed a disbursement.
    ///
    /// # Errors
    /// `PayoutError::UnknownRequest` for an id that is not in flight.
    pub fn confirm(&self, request_id: RequestId) -> Result<(), PayoutError> {
        let (_, inflight) = self
            .inflight
            .remove(&request_id)
            .ok_or(PayoutError::UnknownRequest(request_id))?;
        let mut state = self.state.write();
        state.records[inflight.record_index].status = DisbursementStatus::Confirmed;
        info!(%request_id, contributor = %inflight.contributor, "disbursement confirmed");
        Ok(())
    }

    /// Treasury rejected a disbursement. The gross amount returns to the
    /// contributor's pending balance (by exclusion from disbursed totals)
    /// and is retried on the next pass; the record is marked Rejected, not
    /// removed.
    ///
    /// # Errors
    /// `PayoutError::UnknownRequest` for an id that is not in flight.
    pub fn reject(&self, request_id: RequestId) -> Result<(), PayoutError> {
        let (_, inflight) = self
            .inflight
            .remove(&request_id)
            .ok_or(PayoutError::UnknownRequest(request_id))?;
        let mut state = self.state.write();
        let record = &mut state.records[inflight.record_index];
        record.status = DisbursementStatus::Rejected;
        let net = record.net;
        let lifetime = state.lifetime.entry(inflight.contributor).or_insert(0);
        *lifetime = lifetime.saturating_sub(net);
        warn!(
            %request_id,
            contributor = %inflight.contributor,
            "disbursement rejected; amount returned to pending balance"
        );
        Ok(())
    }

    /// Report requests unconfirmed past their deadline. Each is marked
    /// Overdue at most once but reported on every call until the treasury
    /// answers; the funds remain counted as disbursed in the meantime.
    pub fn overdue(&self, now: u64) -> Vec<RequestId> {
        let mut late = Vec::new();
        for entry in self.inflight.iter() {
            if entry.value().deadline < now {
                late.push(*entry.key());
            }
        }
        if !late.is_empty() {
            let mut state = self.state.write();
            for id in &late {
                if let Some(inflight) = self.inflight.get(id) {
                    let record = &mut state.records[inflight.record_index];
                    if record.status == DisbursementStatus::Submitted {
                        record.status = DisbursementStatus::Overdue;
                        warn!(request = %id, contributor = %inflight.contributor, "disbursement overdue");
                    }
                }
            }
        }
        late
    }

    /// A contributor's current account view.
    pub fn account(&self, contributor: ContributorId) -> ContributorAccount {
        let state = self.state.read();
        ContributorAccount {
            id: contributor,
            pending_balance: state.pending_of(&contributor),
            lifetime_earned: state.lifetime.get(&contributor).copied().unwrap_or(0),
        }
    }

    /// The append-only disbursement history.
    pub fn records(&self) -> Vec<DisbursementRecord> {
        self.state.read().records.clone()
    }
}
