//! Batch result buckets.
//!
//! Batch drivers never stop at the first failing item.  Every item ends up
//! in exactly one of `success` or `failed`; `skipped` holds additional notes
//! about partial work and may mention items that also succeeded.
use std::fmt;

use serde::Serialize;

use crate::error::Result;

/// An item identifier plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemNote {
    pub item: String,
    pub reason: String,
}

impl fmt::Display for ItemNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    pub success: Vec<T>,
    pub failed: Vec<ItemNote>,
    pub skipped: Vec<ItemNote>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self { success: Vec::new(), failed: Vec::new(), skipped: Vec::new() }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// File the outcome of one item.
    pub fn record(&mut self, item: impl fmt::Display, outcome: Result<T>) {
        match outcome {
            Ok(value) => self.success.push(value),
            Err(e) => self.fail(item, e),
        }
    }

    pub fn fail(&mut self, item: impl fmt::Display, reason: impl fmt::Display) {
        let note = ItemNote { item: item.to_string(), reason: reason.to_string() };
        tracing::warn!(item = %note.item, reason = %note.reason, "failed");
        self.failed.push(note);
    }

    pub fn skip(&mut self, item: impl fmt::Display, reason: impl fmt::Display) {
        let note = ItemNote { item: item.to_string(), reason: reason.to_string() };
        tracing::info!(item = %note.item, reason = %note.reason, "skipped");
        self.skipped.push(note);
    }

    /// Items processed (succeeded or failed).
    pub fn processed(&self) -> usize {
        self.success.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self, label: &str) {
        tracing::info!(
            batch = label,
            success = self.success.len(),
            failed = self.failed.len(),
            skipped = self.skipped.len(),
            "batch finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn record_sorts_outcomes() {
        let mut r: BatchReport<u32> = BatchReport::new();
        r.record("C01", Ok(1));
        r.record("C02", Err(Error::NotFound("run 03".into())));
        r.skip("C01", "no coordsystem JSON found");

        assert_eq!(r.success, [1]);
        assert_eq!(r.failed.len(), 1);
        assert_eq!(r.failed[0].item, "C02");
        assert!(r.failed[0].reason.contains("run 03"));
        assert_eq!(r.processed(), 2);
        assert!(!r.is_clean());
        assert_eq!(r.skipped[0].to_string(), "C01: no coordsystem JSON found");
    }
}
