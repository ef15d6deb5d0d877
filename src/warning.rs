//! Rate-limited warnings.
//!
//! Degenerate input (coincident points, for instance) is tolerated, but a large event
//! can hit the same condition thousands of times. [`LimitedWarning`] forwards the first
//! few occurrences to `tracing` and then only counts.

/// Default number of occurrences that are actually emitted.
pub const DEFAULT_MAX_WARNINGS: u32 = 5;

/// A warning that is emitted at most `max` times, then silently counted.
///
/// Each instance is owned by the structure that raises it, so independent runs never
/// share counters.
#[derive(Clone, Debug)]
pub struct LimitedWarning {
    max: u32,
    count: u32,
}

impl LimitedWarning {
    /// Create a warning that is emitted at most `max` times.
    pub fn new(max: u32) -> Self {
        Self { max, count: 0 }
    }

    /// Record one occurrence; emits through `tracing::warn!` while under the limit.
    pub fn warn(&mut self, message: &str) {
        let seen = self.count;
        self.count = self.count.saturating_add(1);
        if seen >= self.max {
            return;
        }
        if seen + 1 == self.max {
            tracing::warn!("{message} (last such warning)");
        } else {
            tracing::warn!("{message}");
        }
    }

    /// Total number of occurrences, including the suppressed ones.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Maximum number of occurrences that are emitted.
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for LimitedWarning {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WARNINGS)
    }
}
