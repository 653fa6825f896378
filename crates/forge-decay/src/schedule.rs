//! Piecewise-linear rate schedules built from a gene's rate view.
//!
//! A schedule is a list of segments, one opened at tier assignment and one
//! more per supersession event. Within a segment the rate interpolates
//! linearly from the segment's opening rate toward the window's end rate at
//! the window's end date. A segment opening at or below the end rate holds
//! flat — the end target never pulls a rate upward, so the rate is
//! non-increasing across the whole window.

use forge_core::error::RateError;
use forge_core::types::RateView;

/// One linear segment of a gene's rate schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    /// When this segment takes effect.
    pub starts_at: u64,
    /// Rate in effect at `starts_at`, in parts-per-billion.
    pub start_rate_ppb: u64,
}

/// A gene's full rate schedule over its royalty window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateSchedule {
    segments: Vec<Segment>,
    end_rate_ppb: u64,
    window_start: u64,
    window_end: u64,
}

/// Linear interpolation from `from` toward `to` after `elapsed` of `span`
/// seconds. Floored; exact at both endpoints. `from >= to` is required by
/// construction (segments never aim upward).
fn interpolate(from: u64, to: u64, elapsed: u64, span: u64) -> u64 {
    debug_assert!(from >= to);
    if span == 0 || elapsed >= span {
        return to;
    }
    let drop = (from - to) as u128 * elapsed as u128 / span as u128;
    from - drop as u64
}

impl RateSchedule {
    /// Build the schedule for a gene.
    ///
    /// Supersession times are sorted defensively; events at or past the
    /// window end are ignored (the rate is already zero there). Events at
    /// the same instant compound — each halves again.
    ///
    /// # Errors
    /// `RateError::EventBeforeWindow` if a supersession predates assignment.
    pub fn build(view: &RateView) -> Result<Self, RateError> {
        let mut events = view.supersession_times.clone();
        events.sort_unstable();

        let mut schedule = Self {
            segments: vec![Segment {
                starts_at: view.assigned_at,
                start_rate_ppb: view.start_ppb,
            }],
            end_rate_ppb: view.end_ppb,
            window_start: view.assigned_at,
            window_end: view.window_end,
        };

        for at in events {
            if at < view.assigned_at {
                return Err(RateError::EventBeforeWindow { at, start: view.assigned_at });
            }
            if at >= view.window_end {
                continue;
            }
            let in_effect = schedule.rate_at(at);
            schedule.segments.push(Segment {
                starts_at: at,
                start_rate_ppb: in_effect / 2,
            });
        }

        Ok(schedule)
    }

    /// The rate in effect at `at`, in parts-per-billion.
    ///
    /// Zero before the window starts and at/after it ends. Zero-duration
    /// windows (Spark, buyout) are zero everywhere.
    pub fn rate_at(&self, at: u64) -> u64 {
        if at < self.window_start || at >= self.window_end {
            return 0;
        }
        // Last segment opened at or before `at`. The first segment opens at
        // window_start, so this always finds one.
        let seg = self
            .segments
            .iter()
            .rev()
            .find(|s| s.starts_at <= at)
            .copied()
            .unwrap_or(self.segments[0]);

        if seg.start_rate_ppb <= self.end_rate_ppb {
            // Halved below the end target: hold flat for the remainder.
            return seg.start_rate_ppb;
        }
        interpolate(
            seg.start_rate_ppb,
            self.end_rate_ppb,
            at - seg.starts_at,
            self.window_end - seg.starts_at,
        )
    }

    /// Number of segments (1 + effective supersession count).
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
