//! Circular moving average over recent headings

use std::collections::VecDeque;

use nalgebra::Vector2;

use crate::math::HeadingVectorExt;

/// Default number of headings kept in the history
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Heading smoother
///
/// Keeps a bounded history of accepted headings (oldest evicted first) and
/// reduces it to one representative heading with the circular mean. The
/// arithmetic mean is wrong on angles: 359° and 1° must average to 0°, not
/// 180°. Each heading becomes a unit vector, the vectors are averaged, and
/// the direction of the mean vector is the result.
///
/// # Example
/// ```
/// use compass_heading::{HeadingSmoother, angular_difference};
///
/// let mut smoother = HeadingSmoother::new(10);
/// smoother.record(359.0);
/// smoother.record(1.0);
///
/// let average = smoother.current_average().unwrap();
/// assert!(angular_difference(0.0, average).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct HeadingSmoother {
    /// Accepted headings, oldest first
    history: VecDeque<f64>,
    /// Maximum history length
    capacity: usize,
}

impl HeadingSmoother {
    /// Create a smoother holding at most `capacity` headings
    ///
    /// A zero capacity is raised to one so the latest heading is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a heading, evicting the oldest once the history is full
    pub fn record(&mut self, heading: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(heading);
    }

    /// Circular mean of the stored headings in `[0, 360)`, or `None` when empty
    pub fn current_average(&self) -> Option<f64> {
        self.mean_vector().map(|mean| mean.to_heading())
    }

    /// Length of the mean unit vector, in `[0, 1]`
    ///
    /// Near 1 when the headings agree, near 0 when they cancel out (e.g. 90°
    /// and 270°), in which case the average direction carries no information.
    pub fn resultant_length(&self) -> Option<f64> {
        self.mean_vector().map(|mean| mean.magnitude())
    }

    fn mean_vector(&self) -> Option<Vector2<f64>> {
        if self.history.is_empty() {
            return None;
        }

        let sum = self
            .history
            .iter()
            .fold(Vector2::zeros(), |sum, &heading| {
                sum + Vector2::<f64>::from_heading(heading)
            });

        Some(sum / self.history.len() as f64)
    }

    /// Drop all stored headings
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Stored headings, oldest first
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HeadingSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
