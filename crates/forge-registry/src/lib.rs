//! # forge-registry — Gene registry, tier classifier, snapshots.
//!
//! The registry is the authoritative store of genes and their derivation
//! graph. Mutations (registration, supersession, usage transitions, expiry,
//! disputes) take the write lock on the registry; attribution never reads
//! the live registry — it runs against an immutable [`RegistrySnapshot`]
//! taken at period close, whose BLAKE3 digest is recorded so a replay
//! against drifted state fails instead of silently diverging.

pub mod classifier;
pub mod registry;
pub mod snapshot;

pub use classifier::{Admission, AdmissionRequest, DisputeAction, DisputeAudit, TierClassifier};
pub use registry::GeneRegistry;
pub use snapshot::RegistrySnapshot;
