//! Published check results.
//!
//! Each plugin instance owns one [`CacheCell`]. The scheduler is the only
//! writer; every probe connection takes a snapshot. Readers never block the
//! writer and always see a whole entry, never a half-updated one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::rules::{AgentResponse, Evaluation};

/// Why a check cycle did not produce a fresh evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("payload is not valid JSON: {0}")]
    Parse(String),

    #[error("metric extraction failed: {0}")]
    Extraction(String),
}

impl PipelineError {
    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch_error",
            PipelineError::Parse(_) => "parse_error",
            PipelineError::Extraction(_) => "extraction_error",
        }
    }
}

/// The most recent published state of one plugin instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Response computed by the last successful cycle.
    pub response: AgentResponse,

    /// Metric value behind `response`, when thresholds produced one.
    pub metric: Option<f64>,

    /// When `response` was computed. `None` until the first success.
    pub fetched_at: Option<Instant>,

    /// Error of the most recent cycle, cleared by the next success.
    pub last_error: Option<PipelineError>,

    /// Number of entries published before this one.
    pub generation: u64,
}

impl CacheEntry {
    /// The entry a plugin starts with, before any fetch has completed.
    pub fn empty() -> Self {
        Self {
            response: AgentResponse::Noop,
            metric: None,
            fetched_at: None,
            last_error: None,
            generation: 0,
        }
    }

    /// Successor entry for a cycle that produced `evaluation`.
    pub fn succeeded(&self, evaluation: Evaluation, now: Instant) -> Self {
        Self {
            response: evaluation.response,
            metric: evaluation.metric,
            fetched_at: Some(now),
            last_error: None,
            generation: self.generation + 1,
        }
    }

    /// Successor entry for a failed cycle: the previous response and its
    /// timestamp are kept so the entry ages towards staleness.
    pub fn failed(&self, error: PipelineError) -> Self {
        Self {
            response: self.response,
            metric: self.metric,
            fetched_at: self.fetched_at,
            last_error: Some(error),
            generation: self.generation + 1,
        }
    }

    /// Successor entry that serves `response` as a fresh result while
    /// still recording the error that caused it.
    pub fn defaulted(&self, response: AgentResponse, error: PipelineError, now: Instant) -> Self {
        Self {
            response,
            metric: None,
            fetched_at: Some(now),
            last_error: Some(error),
            generation: self.generation + 1,
        }
    }

    /// Age of the last successful result, if there was one.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at.map(|at| now.saturating_duration_since(at))
    }
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Single-writer, many-reader holder of the current [`CacheEntry`].
#[derive(Debug)]
pub struct CacheCell {
    current: ArcSwap<CacheEntry>,
}

impl CacheCell {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CacheEntry::empty()),
        }
    }

    /// The entry visible right now.
    pub fn snapshot(&self) -> Arc<CacheEntry> {
        self.current.load_full()
    }

    /// Replace the visible entry.
    pub fn publish(&self, entry: CacheEntry) {
        self.current.store(Arc::new(entry));
    }
}

impl Default for CacheCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Weight;

    fn evaluation(pct: i64, metric: f64) -> Evaluation {
        Evaluation {
            metric: Some(metric),
            response: AgentResponse::Weight(Weight::new(pct).unwrap()),
        }
    }

    #[test]
    fn starts_empty() {
        let cell = CacheCell::new();
        let entry = cell.snapshot();
        assert!(entry.response.is_noop());
        assert!(entry.fetched_at.is_none());
        assert_eq!(entry.generation, 0);
        assert_eq!(entry.age(Instant::now()), None);
    }

    #[test]
    fn failure_keeps_previous_response_and_timestamp() {
        let now = Instant::now();
        let ok = CacheEntry::empty().succeeded(evaluation(40, 6000.0), now);
        let failed = ok.failed(PipelineError::Fetch("connection refused".into()));

        assert_eq!(failed.response.to_string(), "40%");
        assert_eq!(failed.fetched_at, Some(now));
        assert_eq!(failed.generation, 2);
        assert_eq!(failed.last_error.as_ref().map(|e| e.kind()), Some("fetch_error"));

        let recovered = failed.succeeded(evaluation(90, 100.0), now);
        assert!(recovered.last_error.is_none());
        assert_eq!(recovered.generation, 3);
    }

    #[test]
    fn defaulted_entry_is_fresh() {
        let now = Instant::now();
        let entry = CacheEntry::empty().defaulted(
            AgentResponse::Status(crate::rules::Status::Drain),
            PipelineError::Extraction("missing field".into()),
            now,
        );
        assert_eq!(entry.response.to_string(), "drain");
        assert_eq!(entry.fetched_at, Some(now));
        assert!(entry.metric.is_none());
    }

    #[test]
    fn readers_always_see_whole_entries() {
        let cell = Arc::new(CacheCell::new());
        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                let mut entry = CacheEntry::empty();
                for i in 1..=2000u64 {
                    let pct = (i % 100) as i64;
                    entry = entry.succeeded(evaluation(pct, pct as f64), Instant::now());
                    cell.publish(entry.clone());
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    let mut last_generation = 0;
                    for _ in 0..2000 {
                        let entry = cell.snapshot();
                        assert!(entry.generation >= last_generation);
                        last_generation = entry.generation;
                        if let (Some(metric), Some(weight)) = (entry.metric, entry.response.weight()) {
                            assert_eq!(metric as u8, weight.percent());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cell.snapshot().generation, 2000);
    }
}
