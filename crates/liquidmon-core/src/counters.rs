//! Cumulative counter → rate conversion.
//!
//! The kernel exposes CPU time as monotonically increasing tick counters
//! (user/system/idle/nice) and context switches as per-process running totals.
//! Everything displayed is a difference between two consecutive snapshots of
//! those counters. Counter wraparound (32-bit `natural_t` on Darwin) and
//! processes exiting mid-count can make a difference negative; that is
//! treated as a one-sample outlier and clamped to zero.

use serde::{Deserialize, Serialize};

/// One snapshot of cumulative CPU tick counters, host-wide or per logical core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

impl TickSnapshot {
    pub const fn new(user: u64, system: u64, idle: u64, nice: u64) -> Self {
        Self {
            user,
            system,
            idle,
            nice,
        }
    }

    /// Ticks spent doing work: `user + system + nice`.
    pub fn used(&self) -> i128 {
        self.user as i128 + self.system as i128 + self.nice as i128
    }

    /// All ticks: `used + idle`.
    pub fn total(&self) -> i128 {
        self.used() + self.idle as i128
    }
}

/// Fraction of elapsed ticks spent doing work between `prev` and `curr`, in `[0, 1]`.
///
/// Returns 0 when no ticks elapsed or when the counters went backwards
/// (wraparound, sampler restart). Never NaN, never negative.
pub fn used_fraction(prev: &TickSnapshot, curr: &TickSnapshot) -> f64 {
    let total = curr.total() - prev.total();
    if total <= 0 {
        return 0.0;
    }
    let used = curr.used() - prev.used();
    if used <= 0 {
        return 0.0;
    }
    (used as f64 / total as f64).clamp(0.0, 1.0)
}

/// Utilization percentage in `[0, 100]` between two snapshots of the same scope.
pub fn utilization(prev: &TickSnapshot, curr: &TickSnapshot) -> f64 {
    used_fraction(prev, curr) * 100.0
}

/// Per-core utilization, pairing snapshots by index.
///
/// When the previous batch does not line up with the current one (first
/// cycle, or the kernel reported a different core count) every core reads 0.
pub fn per_core_utilization(prev: &[TickSnapshot], curr: &[TickSnapshot]) -> Vec<f64> {
    if prev.len() != curr.len() {
        return vec![0.0; curr.len()];
    }
    prev.iter()
        .zip(curr)
        .map(|(p, c)| utilization(p, c))
        .collect()
}

/// Difference of two running totals, floored at zero.
pub fn counter_rate(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous)
}

/// Tracks a running total across cycles and reports the per-cycle increase.
///
/// The first observation has nothing to compare against and reports 0. A
/// total lower than the previous one (counter reset, a process exiting
/// between enumeration and read) also reports 0 for that cycle.
#[derive(Debug, Clone, Default)]
pub struct CounterRate {
    previous: Option<u64>,
}

impl CounterRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the latest total and get the increase since the last call.
    pub fn update(&mut self, total: u64) -> u64 {
        let rate = match self.previous {
            Some(prev) => counter_rate(prev, total),
            None => 0,
        };
        self.previous = Some(total);
        rate
    }

    /// Last total seen, if any.
    pub fn last_total(&self) -> Option<u64> {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // utilization
    // -----------------------------------------------------------------------

    #[test]
    fn utilization_basic() {
        let prev = TickSnapshot::new(100, 50, 800, 50);
        let curr = TickSnapshot::new(130, 60, 850, 60);
        // used delta = 30 + 10 + 10 = 50, total delta = 50 + 50 = 100
        assert!((utilization(&prev, &curr) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn utilization_no_elapsed_ticks_is_zero() {
        let snap = TickSnapshot::new(10, 20, 30, 40);
        let u = utilization(&snap, &snap);
        assert_eq!(u, 0.0);
        assert!(!u.is_nan());
    }

    #[test]
    fn utilization_wraparound_clamps_to_zero() {
        let prev = TickSnapshot::new(u32::MAX as u64, 10, 10, 0);
        let curr = TickSnapshot::new(5, 10, 10, 0);
        assert_eq!(utilization(&prev, &curr), 0.0);
    }

    #[test]
    fn utilization_idle_only_is_zero() {
        let prev = TickSnapshot::new(10, 10, 100, 0);
        let curr = TickSnapshot::new(10, 10, 200, 0);
        assert_eq!(utilization(&prev, &curr), 0.0);
    }

    #[test]
    fn utilization_fully_busy_is_hundred() {
        let prev = TickSnapshot::new(10, 10, 100, 0);
        let curr = TickSnapshot::new(60, 40, 100, 20);
        assert!((utilization(&prev, &curr) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn utilization_stays_in_range_for_growing_totals() {
        let prev = TickSnapshot::new(1_000, 500, 9_000, 10);
        for step in 1..200u64 {
            let curr = TickSnapshot::new(
                1_000 + step * 3,
                500 + step,
                9_000 + step * 7 % 11,
                10 + step % 2,
            );
            if curr.total() > prev.total() {
                let u = utilization(&prev, &curr);
                assert!((0.0..=100.0).contains(&u), "out of range: {u}");
            }
        }
    }

    #[test]
    fn per_core_mismatch_reports_zeros() {
        let prev = vec![TickSnapshot::default(); 2];
        let curr = vec![TickSnapshot::new(1, 1, 1, 1); 4];
        assert_eq!(per_core_utilization(&prev, &curr), vec![0.0; 4]);
    }

    #[test]
    fn per_core_pairs_by_index() {
        let prev = vec![TickSnapshot::new(0, 0, 0, 0), TickSnapshot::new(0, 0, 0, 0)];
        let curr = vec![TickSnapshot::new(10, 0, 10, 0), TickSnapshot::new(0, 0, 10, 0)];
        let usage = per_core_utilization(&prev, &curr);
        assert!((usage[0] - 50.0).abs() < 1e-9);
        assert_eq!(usage[1], 0.0);
    }

    // -----------------------------------------------------------------------
    // counter rate
    // -----------------------------------------------------------------------

    #[test]
    fn counter_rate_difference() {
        assert_eq!(counter_rate(1000, 1500), 500);
    }

    #[test]
    fn counter_rate_reset_is_zero() {
        assert_eq!(counter_rate(1500, 1000), 0);
    }

    #[test]
    fn counter_rate_tracker_first_sample_is_zero() {
        let mut rate = CounterRate::new();
        assert_eq!(rate.update(1000), 0);
        assert_eq!(rate.update(1500), 500);
        assert_eq!(rate.update(1200), 0);
        assert_eq!(rate.update(1300), 100);
        assert_eq!(rate.last_total(), Some(1300));
    }
}
