//! Thread-safe sequence counter stamped onto `Enter` messages.
//!
//! The counter is the linearization point for clipboard ownership: a screen
//! that received an `Enter` carrying sequence `S` may later report a clipboard
//! grab carrying `S` back, and that grab supersedes any owner recorded under a
//! smaller sequence. Server-side switches and primary-originated grabs both
//! advance the counter, so ownership disputes always resolve to the most
//! recent entry.
//!
//! `AtomicU32` keeps `next()` lock-free; the counter is read and advanced
//! both under the server mutex (switches) and outside it (diagnostics).

use std::sync::atomic::{AtomicU32, Ordering};

/// A monotonically increasing counter for `Enter` sequence numbers.
///
/// The counter starts at 0 and [`next`](SequenceCounter::next) returns the
/// *advanced* value, so the first `Enter` of a session carries sequence 1.
/// Value 0 is reserved for "no entry yet", which makes stale-grab comparisons
/// against a fresh clipboard entry well-defined.
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter whose first [`next`](SequenceCounter::next)
    /// returns 1.
    pub fn new() -> Self {
        Self { inner: AtomicU32::new(0) }
    }

    /// Advances the counter and returns the new value.
    ///
    /// Wraps around from `u32::MAX` to 0 without panicking. `Relaxed` suffices:
    /// the value is only compared for ordering, never used to synchronize
    /// other memory.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the most recently issued value without advancing.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
