//! # forge-decay — Royalty rate decay calculator.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! A gene's royalty rate follows a piecewise-linear schedule:
//! - **Time decay**: linear from the tier's start rate to its end rate
//!   across the royalty window; zero before assignment and after the window.
//! - **Replacement decay**: each supersession event halves the rate in
//!   effect at that instant; the halved rate then decays linearly toward the
//!   *same* end rate over the time remaining in the original window.
//!   Multiple events compound.
//! - The clock never pauses: suspension and disputes gate eligibility in the
//!   attribution engine, not the rate itself.

pub mod calculator;
pub mod schedule;

pub use calculator::RoyaltyRate;
pub use schedule::RateSchedule;
