//! Fixed-length time series for trend display.
//!
//! [`RollingHistory`] is pre-filled with the default value so consumers always
//! see exactly `capacity` points; pushing evicts the oldest point. Per-core
//! histories are allocated lazily on the first per-core sample.
//! [`TrailingWindow`] is the variant without pre-fill, used where an empty
//! history is meaningful (process snapshots).

use std::collections::VecDeque;

/// Default number of points kept per published metric.
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Fixed-capacity FIFO window, pre-filled at construction.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone + Default> RollingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let mut buf = VecDeque::with_capacity(capacity);
        buf.resize(capacity, T::default());
        Self { buf, capacity }
    }

    /// Append the newest value, dropping the oldest.
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    /// Ordered copy, oldest first. Always `capacity` long.
    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone + Default> Default for RollingHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// One [`RollingHistory`] per logical core, in kernel-reported order.
#[derive(Debug, Clone)]
pub struct PerCoreHistory {
    cores: Vec<RollingHistory<f64>>,
    capacity: usize,
}

impl PerCoreHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cores: Vec::new(),
            capacity,
        }
    }

    /// Record one utilization value per core.
    ///
    /// The first non-empty batch allocates the histories. A later batch with
    /// a different core count is skipped for that cycle rather than resizing
    /// in flight; returns `false` when skipped.
    pub fn record(&mut self, usages: &[f64]) -> bool {
        if usages.is_empty() {
            return false;
        }
        if self.cores.is_empty() {
            self.cores = usages
                .iter()
                .map(|_| RollingHistory::new(self.capacity))
                .collect();
        }
        if usages.len() != self.cores.len() {
            log::debug!(
                "per-core sample has {} cores, history has {}; skipping cycle",
                usages.len(),
                self.cores.len()
            );
            return false;
        }
        for (history, &usage) in self.cores.iter_mut().zip(usages) {
            history.push(usage);
        }
        true
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn core(&self, index: usize) -> Option<&RollingHistory<f64>> {
        self.cores.get(index)
    }

    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.cores.iter().map(RollingHistory::snapshot).collect()
    }
}

/// Bounded trailing window without pre-fill; oldest entries drop first.
#[derive(Debug, Clone)]
pub struct TrailingWindow<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> TrailingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        while self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
