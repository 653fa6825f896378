//! Engine constants. All monetary values in embers (1 TOKEN = 10^8 embers).

/// Embers per token. The ember is the smallest accounting subunit; every
/// monetary field in the engine is denominated in embers.
pub const TOKEN: u64 = 100_000_000;

/// Basis-point precision: 10_000 bps = 100%.
///
/// Rates are configured in basis points (the tier table, burn, lineage
/// credit) and converted to parts-per-billion for decay arithmetic.
pub const BPS_PRECISION: u64 = 10_000;

/// Parts-per-billion precision used by the rate calculator.
///
/// 1_000_000_000 ppb = 100%. The linear decay between a tier's start and
/// end rates is interpolated at this resolution so that per-second rate
/// evaluation stays integer-only without losing the sub-bps remainder.
pub const PPB_PRECISION: u64 = 1_000_000_000;

/// Convert a basis-point rate to parts-per-billion.
///
/// # Examples
///
/// ```
/// use forge_core::constants::{bps_to_ppb, BPS_PRECISION, PPB_PRECISION};
/// assert_eq!(bps_to_ppb(BPS_PRECISION), PPB_PRECISION); // 100%
/// assert_eq!(bps_to_ppb(500), 50_000_000);              // 5%
/// ```
pub const fn bps_to_ppb(bps: u64) -> u64 {
    bps * (PPB_PRECISION / BPS_PRECISION)
}

/// Seconds in a day.
pub const DAY_SECS: u64 = 86_400;

/// Seconds in an accounting month (fixed 30-day months).
///
/// Royalty windows are specified in months; a fixed-length month keeps the
/// decay schedule deterministic and replayable regardless of calendar drift.
pub const MONTH_SECS: u64 = 30 * DAY_SECS;

// --- Tier rate table (start/end rates and window lengths) ---

/// Flame: 2% decaying to 0% over 6 months.
pub const FLAME_START_BPS: u64 = 200;
pub const FLAME_END_BPS: u64 = 0;
pub const FLAME_DURATION_MONTHS: u64 = 6;

/// FurnaceForged: 5% decaying to 1% over 12 months (18 when the gene is
/// production-integrated).
pub const FURNACE_START_BPS: u64 = 500;
pub const FURNACE_END_BPS: u64 = 100;
pub const FURNACE_DURATION_MONTHS: u64 = 12;
pub const FURNACE_INTEGRATED_DURATION_MONTHS: u64 = 18;

/// Invariant: 8% decaying to 2% over 24 months (or a one-time buyout,
/// exclusive of the stream).
pub const INVARIANT_START_BPS: u64 = 800;
pub const INVARIANT_END_BPS: u64 = 200;
pub const INVARIANT_DURATION_MONTHS: u64 = 24;

// --- Lineage credit ---

/// Flat lineage credit paid to each eligible ancestor: 0.5% of the earning
/// descendant's gross attributable revenue.
pub const LINEAGE_CREDIT_BPS: u64 = 50;

/// Maximum derivation distance that still earns lineage credit.
pub const LINEAGE_MAX_DEPTH: u32 = 2;

// --- Usage decay ---

/// A gene with no invocations for longer than this window is suspended.
/// The decay clock keeps running while suspended.
pub const USAGE_SUSPEND_SECS: u64 = 90 * DAY_SECS;

// --- Payout ---

/// Flat burn applied to the gross disbursement total: 5%.
pub const BURN_BPS: u64 = 500;

/// Minimum net amount (in embers) that triggers a disbursement; smaller
/// totals roll forward untouched, with no burn taken until finally paid.
pub const MIN_PAYOUT: u64 = 100 * TOKEN;

/// Treasury must confirm a disbursement request within 14 days of period
/// close; past this the request is reported as overdue, not retried forever.
pub const CONFIRM_WINDOW_SECS: u64 = 14 * DAY_SECS;
