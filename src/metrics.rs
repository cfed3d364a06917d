// ═══════════════════════════════════════════════════════════════
// METRICS - What happened this run, per source and in total
// ═══════════════════════════════════════════════════════════════
//
// Source tasks run concurrently and bump shared atomic counters as they
// finish. Once everything is joined the orchestrator takes a snapshot and
// folds it, together with one SourceReport per source, into a RunSummary.
// The summary is logged at the end of the run and handed back to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ExtractionPath;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Failed,
}

/// How one source fared.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    /// `None` when nothing was extracted because the fetch failed.
    pub path: Option<ExtractionPath>,
    pub http_status: Option<u16>,
    pub records: usize,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Counter values at the moment of the snapshot.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sources_succeeded: u64,
    pub sources_failed: u64,
    pub sources_degraded: u64,
    pub records_extracted: u64,
    pub duplicates_dropped: u64,
    pub records_ranked: u64,
    pub digest_size: u64,
    pub elapsed_ms: u64,
}

/// Lock-free counters shared by every task in a run.
pub struct MetricsCollector {
    sources_succeeded: AtomicU64,
    sources_failed: AtomicU64,
    sources_degraded: AtomicU64,
    records_extracted: AtomicU64,
    duplicates_dropped: AtomicU64,
    records_ranked: AtomicU64,
    digest_size: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            sources_succeeded: AtomicU64::new(0),
            sources_failed: AtomicU64::new(0),
            sources_degraded: AtomicU64::new(0),
            records_extracted: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            records_ranked: AtomicU64::new(0),
            digest_size: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count a finished source by its report.
    pub fn record_source(&self, report: &SourceReport) {
        match report.status {
            SourceStatus::Ok => self.sources_succeeded.fetch_add(1, Ordering::Relaxed),
            SourceStatus::Failed => self.sources_failed.fetch_add(1, Ordering::Relaxed),
        };
        if report.path == Some(ExtractionPath::Degraded) {
            self.sources_degraded.fetch_add(1, Ordering::Relaxed);
        }
        self.records_extracted.fetch_add(report.records as u64, Ordering::Relaxed);
    }

    pub fn add_duplicates_dropped(&self, n: usize) {
        self.duplicates_dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn set_ranked(&self, n: usize) {
        self.records_ranked.store(n as u64, Ordering::Relaxed);
    }

    pub fn set_digest_size(&self, n: usize) {
        self.digest_size.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sources_succeeded: self.sources_succeeded.load(Ordering::Relaxed),
            sources_failed: self.sources_failed.load(Ordering::Relaxed),
            sources_degraded: self.sources_degraded.load(Ordering::Relaxed),
            records_extracted: self.records_extracted.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            records_ranked: self.records_ranked.load(Ordering::Relaxed),
            digest_size: self.digest_size.load(Ordering::Relaxed),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Everything worth knowing about one run once it is over.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub totals: MetricsSnapshot,
    /// Human-readable delivery result, e.g. "5 records delivered to Telegram".
    pub delivery: String,
}

impl RunSummary {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.status == SourceStatus::Failed)
    }

    /// One line per source, then the totals.
    pub fn log(&self) {
        for s in &self.sources {
            match s.status {
                SourceStatus::Ok => info!(
                    run_id = %self.run_id,
                    source = %s.source,
                    path = ?s.path,
                    http_status = ?s.http_status,
                    records = s.records,
                    elapsed_ms = s.elapsed_ms,
                    "📦 Source done"
                ),
                SourceStatus::Failed => warn!(
                    run_id = %self.run_id,
                    source = %s.source,
                    error = s.error.as_deref().unwrap_or("unknown"),
                    elapsed_ms = s.elapsed_ms,
                    "❌ Source failed"
                ),
            }
        }

        let t = &self.totals;
        info!(
            run_id = %self.run_id,
            sources_ok = t.sources_succeeded,
            sources_failed = t.sources_failed,
            degraded = t.sources_degraded,
            extracted = t.records_extracted,
            duplicates = t.duplicates_dropped,
            ranked = t.records_ranked,
            digest = t.digest_size,
            delivery = %self.delivery,
            elapsed_ms = t.elapsed_ms,
            "📊 Run complete"
        );
    }
}
