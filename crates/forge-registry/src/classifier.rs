//! Tier classification state machine.
//!
//! Maps external testing-harness verdicts to an entitlement tier and mints
//! the gene. Transitions are one-shot per artifact: re-submitting the same
//! artifact never retroactively changes an existing gene's tier — a new
//! gene must be registered.
//!
//! Threshold table:
//!
//! | Tier          | Trigger                    | Window        |
//! |---------------|----------------------------|---------------|
//! | Spark         | pass base harness          | flat payment  |
//! | Flame         | harness + extraction       | 2% -> 0%, 6mo |
//! | FurnaceForged | harness + registered       | 5% -> 1%, 12mo (18 integrated) |
//! | Invariant     | external designation only  | 8% -> 2%, 24mo or buyout |
//!
//! FurnaceForged and Invariant additionally require the external
//! [`Authorizer`] to confirm; the classifier holds no policy about who may
//! authorize what.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use forge_core::error::TierError;
use forge_core::traits::Authorizer;
use forge_core::types::{
    ContributorId, Gene, GeneEvent, GeneId, GeneStatus, HarnessVerdict, InvariantGrant, Tier,
    TierParams,
};

use crate::registry::GeneRegistry;

/// A request to admit a candidate artifact at a target tier.
#[derive(Clone, Debug)]
pub struct AdmissionRequest {
    pub verdict: HarnessVerdict,
    pub target: Tier,
    pub contributor: ContributorId,
    pub parent_ids: BTreeSet<GeneId>,
    /// Stream vs. one-time buyout; only consulted for Invariant.
    pub grant: InvariantGrant,
    /// Spark's flat payment, in embers. Ignored for other tiers.
    pub flat_payment: Option<u64>,
}

/// Result of a successful admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub gene_id: GeneId,
    pub tier: Tier,
    /// Spark flat payment or Invariant buyout, routed to the payout
    /// scheduler as a one-time credit.
    pub one_time_credit: Option<u64>,
}

/// What a dispute audit entry records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisputeAction {
    Opened,
    Resolved { tier: Tier },
}

/// Append-only audit record of a dispute action, attributable to the
/// external authority that took it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisputeAudit {
    pub gene: GeneId,
    pub authority: ContributorId,
    pub action: DisputeAction,
    pub reason: String,
    pub at: u64,
}

/// The tier classifier. Holds the authorization seam and the dispute audit
/// log; all gene state lives in the registry.
pub struct TierClassifier {
    authorizer: Arc<dyn Authorizer>,
    audit: RwLock<Vec<DisputeAudit>>,
}

impl TierClassifier {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer, audit: RwLock::new(Vec::new()) }
    }

    /// Check the verdict against the threshold table for `target`.
    ///
    /// Invariant has no verdict threshold — it is reachable by external
    /// designation only, gated purely by authorization.
    fn check_eligibility(verdict: &HarnessVerdict, target: Tier) -> Result<(), TierError> {
        let eligible = match target {
            Tier::Spark => verdict.harness_passed,
            Tier::Flame => verdict.harness_passed && verdict.extraction_passed,
            Tier::FurnaceForged => verdict.harness_passed && verdict.artifact_registered,
            Tier::Invariant => true,
        };
        if !eligible {
            return Err(TierError::IneligibleVerdict { target });
        }
        Ok(())
    }

    /// Admit a candidate: verdict check, authorization check, one-shot
    /// guard, then gene registration.
    ///
    /// # Errors
    /// - `IneligibleVerdict` if the verdict misses the target's threshold
    /// - `RequiresAuthorization` if FurnaceForged/Invariant is not confirmed
    /// - `AlreadyClassified` if the artifact already backs a gene
    /// - `Registry(_)` for graph integrity failures
    pub fn admit(
        &self,
        registry: &GeneRegistry,
        request: AdmissionRequest,
    ) -> Result<Admission, TierError> {
        let verdict = &request.verdict;
        Self::check_eligibility(verdict, request.target)?;

        if request.target.requires_authorization()
            && !self.authorizer.authorize(&verdict.candidate, request.target)
        {
            warn!(artifact = %verdict.candidate, target = ?request.target, "authorization declined");
            return Err(TierError::RequiresAuthorization { target: request.target });
        }

        if registry.artifact_registered(&verdict.candidate) {
            return Err(TierError::AlreadyClassified(verdict.candidate.0));
        }

        let (params, one_time_credit) = match (request.target, request.grant) {
            (Tier::Invariant, InvariantGrant::Buyout(amount)) => {
                // Buyout is exclusive of the stream: zero-duration window.
                (TierParams { start_bps: 0, end_bps: 0, duration_months: 0 }, Some(amount))
            }
            (Tier::Spark, _) => (request.target.params(false), request.flat_payment),
            _ => (request.target.params(verdict.production_integrated), None),
        };

        let gene_id = GeneId::derive(&verdict.candidate, &request.contributor);
        let gene = Gene {
            id: gene_id,
            contributor: request.contributor,
            source_artifact: verdict.candidate,
            parent_ids: request.parent_ids,
            child_ids: BTreeSet::new(),
            tier: request.target,
            tier_assigned_at: verdict.at,
            params,
            status: GeneStatus::Active,
            production_integrated: verdict.production_integrated,
            last_active_at: None,
            supersessions: vec![],
            events: vec![
                GeneEvent::Registered { at: verdict.at },
                GeneEvent::TierAssigned { at: verdict.at, tier: request.target },
            ],
        };
        registry.register(gene)?;
        info!(gene = %gene_id, tier = ?request.target, "gene admitted");
        Ok(Admission { gene_id, tier: request.target, one_time_credit })
    }

    /// Place a gene under dispute: payout accrual halts, the decay clock
    /// does not.
    ///
    /// # Errors
    /// `Registry(_)` if the gene is unknown or already Expired.
    pub fn open_dispute(
        &self,
        registry: &GeneRegistry,
        gene: GeneId,
        authority: ContributorId,
        reason: &str,
        at: u64,
    ) -> Result<(), TierError> {
        registry.transition(
            gene,
            GeneStatus::Disputed,
            GeneEvent::DisputeOpened { at, authority, reason: reason.to_string() },
        )?;
        self.audit.write().push(DisputeAudit {
            gene,
            authority,
            action: DisputeAction::Opened,
            reason: reason.to_string(),
            at,
        });
        Ok(())
    }

    /// Resolve a dispute to any tier (the one path on which tier may
    /// regress). The window start is never moved, so resolution cannot
    /// extend a royalty window; if the original window is already over the
    /// gene goes straight to Expired.
    ///
    /// # Errors
    /// - `NotDisputed` if the gene is not under dispute
    /// - `Registry(_)` if the gene is unknown
    pub fn resolve_dispute(
        &self,
        registry: &GeneRegistry,
        gene: GeneId,
        tier: Tier,
        authority: ContributorId,
        reason: &str,
        at: u64,
    ) -> Result<(), TierError> {
        let current = registry
            .get(&gene)
            .ok_or(forge_core::error::RegistryError::UnknownGene(gene))?;
        if current.status != GeneStatus::Disputed {
            return Err(TierError::NotDisputed(gene));
        }

        registry.with_gene_mut(gene, |g| {
            g.tier = tier;
            g.params = tier.params(g.production_integrated);
            g.events.push(GeneEvent::DisputeResolved {
                at,
                authority,
                tier,
                reason: reason.to_string(),
            });
            g.status = if g.window_expired(at) { GeneStatus::Expired } else { GeneStatus::Active };
        })?;

        self.audit.write().push(DisputeAudit {
            gene,
            authority,
            action: DisputeAction::Resolved { tier },
            reason: reason.to_string(),
            at,
        });
        info!(gene = %gene, tier = ?tier, "dispute resolved");
        Ok(())
    }

    /// The append-only dispute audit log.
    pub fn audit_log(&self) -> Vec<DisputeAudit> {
        self.audit.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use forge_core::types::{ArtifactId, Hash256};

    /// Authorizer that approves everything.
    struct ApproveAll;
    impl Authorizer for ApproveAll {
        fn authorize(&self, _artifact: &ArtifactId, _target: Tier) -> bool {
            true
        }
    }

    /// Authorizer that declines everything.
    struct DeclineAll;
    impl Authorizer for DeclineAll {
        fn authorize(&self, _artifact: &ArtifactId, _target: Tier) -> bool {
            false
        }
    }

    fn h(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    fn verdict(seed: u8, harness: bool, extraction: bool, registered: bool) -> HarnessVerdict {
        HarnessVerdict {
            candidate: ArtifactId(h(seed)),
            harness_passed: harness,
            extraction_passed: extraction,
            artifact_registered: registered,
            production_integrated: false,
            at: 1_000,
        }
    }

    fn request(seed: u8, target: Tier, v: HarnessVerdict) -> AdmissionRequest {
        AdmissionRequest {
            verdict: v,
            target,
            contributor: ContributorId(h(seed.wrapping_add(50))),
            parent_ids: BTreeSet::new(),
            grant: InvariantGrant::Stream,
            flat_payment: None,
        }
    }

    fn classifier() -> TierClassifier {
        TierClassifier::new(Arc::new(ApproveAll))
    }

    #[test]
    fn flame_requires_extraction() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let err = c
            .admit(&reg, request(1, Tier::Flame, verdict(1, true, false, false)))
            .unwrap_err();
        assert_eq!(err, TierError::IneligibleVerdict { target: Tier::Flame });

        let ok = c
            .admit(&reg, request(2, Tier::Flame, verdict(2, true, true, false)))
            .unwrap();
        assert_eq!(ok.tier, Tier::Flame);
        assert_eq!(reg.get(&ok.gene_id).unwrap().params.duration_months, 6);
    }

    #[test]
    fn spark_requires_only_harness() {
        let reg = GeneRegistry::new();
        let c = classifier();
        assert!(matches!(
            c.admit(&reg, request(1, Tier::Spark, verdict(1, false, false, false))),
            Err(TierError::IneligibleVerdict { .. })
        ));
        let mut req = request(2, Tier::Spark, verdict(2, true, false, false));
        req.flat_payment = Some(5_000);
        let adm = c.admit(&reg, req).unwrap();
        assert_eq!(adm.one_time_credit, Some(5_000));
        // No royalty stream.
        assert_eq!(reg.get(&adm.gene_id).unwrap().params.duration_months, 0);
    }

    #[test]
    fn furnace_requires_authorization() {
        let reg = GeneRegistry::new();
        let declined = TierClassifier::new(Arc::new(DeclineAll));
        let err = declined
            .admit(&reg, request(1, Tier::FurnaceForged, verdict(1, true, true, true)))
            .unwrap_err();
        assert_eq!(err, TierError::RequiresAuthorization { target: Tier::FurnaceForged });

        let approved = classifier();
        assert!(approved
            .admit(&reg, request(1, Tier::FurnaceForged, verdict(1, true, true, true)))
            .is_ok());
    }

    #[test]
    fn furnace_integrated_gets_18_months() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let mut v = verdict(1, true, true, true);
        v.production_integrated = true;
        let adm = c.admit(&reg, request(1, Tier::FurnaceForged, v)).unwrap();
        assert_eq!(reg.get(&adm.gene_id).unwrap().params.duration_months, 18);
    }

    #[test]
    fn invariant_is_designation_only() {
        let reg = GeneRegistry::new();
        let c = classifier();
        // No verdict bits at all — only authorization matters.
        let adm = c
            .admit(&reg, request(1, Tier::Invariant, verdict(1, false, false, false)))
            .unwrap();
        assert_eq!(reg.get(&adm.gene_id).unwrap().params.duration_months, 24);
        assert_eq!(adm.one_time_credit, None);
    }

    #[test]
    fn invariant_buyout_is_exclusive_of_stream() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let mut req = request(1, Tier::Invariant, verdict(1, false, false, false));
        req.grant = InvariantGrant::Buyout(1_000_000);
        let adm = c.admit(&reg, req).unwrap();
        assert_eq!(adm.one_time_credit, Some(1_000_000));
        let gene = reg.get(&adm.gene_id).unwrap();
        assert_eq!(gene.params.duration_months, 0);
        assert_eq!(gene.params.start_bps, 0);
    }

    #[test]
    fn classification_is_one_shot_per_artifact() {
        let reg = GeneRegistry::new();
        let c = classifier();
        c.admit(&reg, request(1, Tier::Flame, verdict(1, true, true, false)))
            .unwrap();
        // Same artifact, higher verdict: still rejected.
        let err = c
            .admit(&reg, request(9, Tier::FurnaceForged, verdict(1, true, true, true)))
            .unwrap_err();
        assert!(matches!(err, TierError::AlreadyClassified(_)));
    }

    #[test]
    fn dispute_halts_and_resolution_restores() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let adm = c
            .admit(&reg, request(1, Tier::FurnaceForged, verdict(1, true, true, true)))
            .unwrap();
        let authority = ContributorId(h(0xEE));

        c.open_dispute(&reg, adm.gene_id, authority, "rate contested", 2_000)
            .unwrap();
        assert_eq!(reg.get(&adm.gene_id).unwrap().status, GeneStatus::Disputed);

        // Resolution may regress the tier — the one sanctioned path.
        c.resolve_dispute(&reg, adm.gene_id, Tier::Flame, authority, "downgraded", 3_000)
            .unwrap();
        let gene = reg.get(&adm.gene_id).unwrap();
        assert_eq!(gene.tier, Tier::Flame);
        assert_eq!(gene.status, GeneStatus::Active);
        // Window start is never moved by resolution.
        assert_eq!(gene.tier_assigned_at, 1_000);
    }

    #[test]
    fn resolve_requires_open_dispute() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let adm = c
            .admit(&reg, request(1, Tier::Flame, verdict(1, true, true, false)))
            .unwrap();
        let err = c
            .resolve_dispute(&reg, adm.gene_id, Tier::Flame, ContributorId(h(9)), "x", 10)
            .unwrap_err();
        assert_eq!(err, TierError::NotDisputed(adm.gene_id));
    }

    #[test]
    fn audit_log_records_authority_and_reason() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let adm = c
            .admit(&reg, request(1, Tier::Flame, verdict(1, true, true, false)))
            .unwrap();
        let authority = ContributorId(h(0xEE));
        c.open_dispute(&reg, adm.gene_id, authority, "claim overlap", 2_000)
            .unwrap();
        c.resolve_dispute(&reg, adm.gene_id, Tier::Flame, authority, "upheld", 3_000)
            .unwrap();

        let log = c.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, DisputeAction::Opened);
        assert_eq!(log[0].reason, "claim overlap");
        assert_eq!(log[1].action, DisputeAction::Resolved { tier: Tier::Flame });
        assert_eq!(log[1].authority, authority);
    }

    #[test]
    fn dispute_does_not_pause_decay_clock() {
        let reg = GeneRegistry::new();
        let c = classifier();
        let adm = c
            .admit(&reg, request(1, Tier::Flame, verdict(1, true, true, false)))
            .unwrap();
        let authority = ContributorId(h(0xEE));
        c.open_dispute(&reg, adm.gene_id, authority, "held", 2_000).unwrap();

        // Resolution after the 6-month window lands straight in Expired.
        let after_window = 1_000 + 7 * 30 * 86_400;
        c.resolve_dispute(&reg, adm.gene_id, Tier::Flame, authority, "late", after_window)
            .unwrap();
        assert_eq!(reg.get(&adm.gene_id).unwrap().status, GeneStatus::Expired);
    }
}
