//! Batch history tracking for debugging and diagnostics.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::protocol::Frame;

/// Outcome of a flushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOutcome {
    Sent,
    Failed,
}

/// A recorded batch in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub outcome: BatchOutcome,
    /// Frames of the batch as hex strings.
    pub frames: Vec<String>,
    /// Socket writes performed, repeats included.
    pub writes: usize,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Tracks flushed batches for debugging.
#[derive(Debug, Clone)]
pub struct FrameHistory {
    counts: HashMap<BatchOutcome, usize>,
    frames_written: usize,
    last_error: Option<String>,
    start_time: Instant,
    entries: Vec<HistoryEntry>,
    max_entries: usize,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self {
            counts: HashMap::from([(BatchOutcome::Sent, 0), (BatchOutcome::Failed, 0)]),
            frames_written: 0,
            last_error: None,
            start_time: Instant::now(),
            entries: Vec::new(),
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::new()
        }
    }

    pub fn record(&mut self, outcome: BatchOutcome, frames: &[Frame], writes: usize) {
        *self.counts.entry(outcome).or_default() += 1;
        self.frames_written += writes;

        self.entries.push(HistoryEntry {
            outcome,
            frames: frames.iter().map(Frame::to_string).collect(),
            writes,
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.values_mut().for_each(|c| *c = 0);
        self.frames_written = 0;
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |o: BatchOutcome| self.counts.get(&o).copied().unwrap_or(0);
        HistorySummary {
            sent_batches: count(BatchOutcome::Sent),
            failed_batches: count(BatchOutcome::Failed),
            frames_written: self.frames_written,
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of batch history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub sent_batches: usize,
    pub failed_batches: usize,
    pub frames_written: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_batch() {
        let mut history = FrameHistory::new();
        let frames = [Frame::legacy([0x42, 0x00, 0x55])];
        history.record(BatchOutcome::Sent, &frames, 3);

        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].frames, vec!["42 00 55"]);
        assert_eq!(history.summary().frames_written, 3);
    }

    #[test]
    fn test_record_error() {
        let mut history = FrameHistory::new();
        history.record_error("socket send error");
        assert_eq!(history.last_error(), Some("socket send error"));
        assert_eq!(history.summary().last_error.as_deref(), Some("socket send error"));
    }

    #[test]
    fn test_max_entries() {
        let mut history = FrameHistory::with_max_entries(2);
        for i in 0..5 {
            history.record(BatchOutcome::Sent, &[Frame::legacy([i, 0x00, 0x55])], 1);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.summary().sent_batches, 5);
    }

    #[test]
    fn test_clear() {
        let mut history = FrameHistory::new();
        history.record(BatchOutcome::Failed, &[], 0);
        history.record_error("boom");
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.summary().failed_batches, 0);
        assert_eq!(history.last_error(), None);
    }
}
