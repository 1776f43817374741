//! Fixed-capacity sample accumulator with a running mean.
//!
//! A [`RollingAverage`] is a true sliding window: once full, admitting a new
//! sample evicts the oldest one first. The running sum is maintained
//! incrementally so `add` and `average` are O(1).
//!
//! The hourly and daily tiers never rely on eviction in practice; the engine
//! sizes them to hold a whole bucket and calls [`RollingAverage::reset`] after
//! every flush, so their windows are bucket-aligned and non-overlapping.

use std::collections::VecDeque;

use crate::error::AverageError;

/// Fixed-capacity FIFO window of samples with an O(1) running mean.
///
/// # Invariants
///
/// - `len() <= capacity()` at all times
/// - `sum` equals the sum of the retained samples (up to float rounding)
///
/// # Example
///
/// ```rust
/// use thermolog::rolling::RollingAverage;
///
/// let mut window = RollingAverage::new(3);
/// for v in [10.0, 20.0, 30.0, 40.0] {
///     window.add(v);
/// }
/// assert_eq!(window.len(), 3);
/// assert_eq!(window.average().unwrap(), 30.0);
/// ```
#[derive(Debug, Clone)]
pub struct RollingAverage {
    /// Maximum number of retained samples.
    capacity: usize,
    /// Retained samples, oldest at the front.
    samples: VecDeque<f64>,
    /// Running total of `samples`.
    sum: f64,
}

impl RollingAverage {
    /// Creates an empty accumulator holding at most `capacity` samples.
    ///
    /// A capacity of zero is bumped to one; [`EngineConfig`](crate::config::EngineConfig)
    /// validation rejects it before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(4096)),
            sum: 0.0,
        }
    }

    /// Admits `value`, evicting the oldest sample first when full.
    ///
    /// NaN and infinities are accepted as-is and will poison the average.
    pub fn add(&mut self, value: f64) {
        if self.samples.len() == self.capacity
            && let Some(oldest) = self.samples.pop_front()
        {
            self.sum -= oldest;
        }
        self.samples.push_back(value);
        self.sum += value;
    }

    /// Returns the arithmetic mean of the retained samples.
    ///
    /// # Errors
    ///
    /// Returns [`AverageError::EmptyBuffer`] when no samples are retained.
    #[allow(clippy::cast_precision_loss)] // counts are bounded by capacity
    pub fn average(&self) -> Result<f64, AverageError> {
        if self.samples.is_empty() {
            return Err(AverageError::EmptyBuffer);
        }
        Ok(self.sum / self.samples.len() as f64)
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears all samples and the running sum.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }

    /// Iterates over the retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}
