//! # forge-attribution — Per-period revenue splitting.
//!
//! Consumes a closed revenue period and a registry snapshot, splits the
//! period's attributable revenue across active genes in proportion to
//! invocation volume, applies each gene's decayed royalty rate, and
//! propagates bounded lineage credit up the derivation graph. The result is
//! a pure function of its inputs: re-running a period against the same
//! snapshot reproduces the identical output, and the conservation bound
//! (direct royalties plus lineage credits never exceed period revenue) is
//! asserted, not assumed.

pub mod engine;

pub use engine::{AttributionEngine, AttributionLine, LineageLine, PeriodAttribution};
