//! Point-in-time registry snapshots.
//!
//! Attribution for a period runs against a snapshot taken at period close,
//! never the live registry. The snapshot's BLAKE3 digest over the canonical
//! bincode encoding of the gene map is recorded with the period's results;
//! replaying the period against a registry that has since drifted fails
//! `StalePeriodReplay` rather than silently producing different numbers.

use std::collections::{BTreeMap, BTreeSet};

use forge_core::error::AttributionError;
use forge_core::types::{Gene, GeneId, Hash256};

use crate::registry::collect_ancestors;

/// An immutable copy of registry state with a deterministic digest.
#[derive(Clone, Debug)]
pub struct RegistrySnapshot {
    /// When the snapshot was taken (period close).
    pub taken_at: u64,
    /// BLAKE3 over the bincode encoding of the gene map. The map is a
    /// BTreeMap, so the encoding — and therefore the digest — is
    /// independent of insertion order.
    pub digest: Hash256,
    genes: BTreeMap<GeneId, Gene>,
}

impl RegistrySnapshot {
    pub(crate) fn new(taken_at: u64, genes: BTreeMap<GeneId, Gene>) -> Self {
        let digest = digest_genes(&genes);
        Self { taken_at, digest, genes }
    }

    /// Look up a gene in the snapshot.
    pub fn get(&self, id: &GeneId) -> Option<&Gene> {
        self.genes.get(id)
    }

    /// Iterate all genes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Gene> {
        self.genes.values()
    }

    /// Ancestors of `id` up to `max_depth` hops (deduplicated, excludes `id`).
    pub fn ancestors(&self, id: GeneId, max_depth: u32) -> BTreeSet<GeneId> {
        collect_ancestors(&self.genes, id, max_depth)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Verify this snapshot matches a previously recorded digest.
    ///
    /// # Errors
    /// `AttributionError::StalePeriodReplay` on mismatch — the caller should
    /// re-snapshot and recompute rather than trust stale results.
    pub fn verify_digest(&self, expected: Hash256) -> Result<(), AttributionError> {
        if self.digest != expected {
            return Err(AttributionError::StalePeriodReplay {
                expected,
                actual: self.digest,
            });
        }
        Ok(())
    }
}

fn digest_genes(genes: &BTreeMap<GeneId, Gene>) -> Hash256 {
    // Encoding a BTreeMap cannot fail; the fallback only guards the
    // bincode API shape.
    let bytes = bincode::encode_to_vec(genes, bincode::config::standard()).unwrap_or_default();
    Hash256(blake3::hash(&bytes).into())
}
