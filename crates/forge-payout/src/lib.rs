//! # forge-payout — Disbursement scheduling.
//!
//! Aggregates attribution output per contributor, applies the minimum-payout
//! threshold and the flat burn, and emits disbursement requests to the
//! external treasury. Pending balances are an absolute function of
//! settlement history (settled periods + one-time credits − disbursed
//! gross), so resettling a period with corrected inputs overwrites rather
//! than double-applies, and treasury rejections return funds by exclusion
//! instead of by compensating writes.

pub mod scheduler;

pub use scheduler::PayoutScheduler;
