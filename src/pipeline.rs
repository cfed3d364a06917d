// =============================================================================
// pipeline.rs: FETCH, EXTRACT, DEDUP, SCORE, DELIVER
// =============================================================================
//
// One run of the monitor, start to finish:
//
//   ┌──────────┐   ┌──────────┐   ┌──────────┐
//   │ source 1 │   │ source 2 │   │ source 3 │   one tokio task each,
//   │ fetch    │   │ fetch    │   │ fetch    │   fetch + extract
//   │ extract  │   │ extract  │   │ extract  │
//   └────┬─────┘   └────┬─────┘   └────┬─────┘
//        └──────── join in config order ───────┘
//                        │
//                  dedup → score → deliver
//
// A source that errors (or whose task panics) contributes zero records and a
// failed SourceReport. Nothing a single source does can stop the run. The
// join is in configured order, not completion order, so the same inputs
// always dedup and rank the same way no matter which server answered first.
//
// Delivery failures are logged and reported but do not fail the run: the
// ranking was still produced correctly.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError, SourceConfig};
use crate::dedup::dedupe;
use crate::extractors::{self, Extractor};
use crate::metrics::{MetricsCollector, RunSummary, SourceReport, SourceStatus};
use crate::models::{CanonicalRecord, ScoredRecord, SourceKind};
use crate::notifier::{DeliveryError, DeliveryOutcome, Notifier};
use crate::scoring::ScoringEngine;
use crate::transport::{Fetch, FetchOptions};

/// What a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub ranked: Vec<ScoredRecord>,
    pub delivery: Result<DeliveryOutcome, DeliveryError>,
    pub summary: RunSummary,
}

pub struct Pipeline {
    config: Arc<Config>,
    transport: Arc<dyn Fetch>,
    sources: Vec<(SourceConfig, Arc<dyn Extractor>)>,
    scoring: ScoringEngine,
    notifier: Notifier,
}

impl Pipeline {
    pub fn new(config: Config, transport: Arc<dyn Fetch>) -> Result<Self, ConfigError> {
        config.validate()?;

        let notifier = Notifier::new(&config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let scoring = ScoringEngine::new(&config.scoring);
        let sources = config
            .sources
            .iter()
            .map(|source| (source.clone(), extractors::for_source(source, config.min_bonus)))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            transport,
            sources,
            scoring,
            notifier,
        })
    }

    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let metrics = Arc::new(MetricsCollector::new());

        info!(run_id = %run_id, sources = self.sources.len(), "🚀 Run starting");

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|(source, extractor)| {
                let transport = Arc::clone(&self.transport);
                let extractor = Arc::clone(extractor);
                let source = source.clone();
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    let (records, report) = collect_source(transport.as_ref(), extractor.as_ref(), &source).await;
                    metrics.record_source(&report);
                    (records, report)
                })
            })
            .collect();

        let mut records: Vec<CanonicalRecord> = Vec::new();
        let mut reports = Vec::with_capacity(self.sources.len());
        for ((source, _), joined) in self.sources.iter().zip(join_all(handles).await) {
            match joined {
                Ok((source_records, report)) => {
                    records.extend(source_records);
                    reports.push(report);
                }
                Err(e) => {
                    error!(source = %source.id, error = %e, "Source task died");
                    let report = SourceReport {
                        source: source.id.clone(),
                        status: SourceStatus::Failed,
                        path: None,
                        http_status: None,
                        records: 0,
                        error: Some(format!("task failed: {e}")),
                        elapsed_ms: 0,
                    };
                    metrics.record_source(&report);
                    reports.push(report);
                }
            }
        }

        let (unique, dropped) = dedupe(records);
        metrics.add_duplicates_dropped(dropped);

        let ranked = self.scoring.score(&unique);
        metrics.set_ranked(ranked.len());

        let delivery = self.notifier.deliver(&ranked).await;
        let delivery_text = match &delivery {
            Ok(outcome) => {
                if let DeliveryOutcome::LocalOutput { records } | DeliveryOutcome::Delivered { records } = outcome {
                    metrics.set_digest_size(*records);
                }
                outcome.to_string()
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Digest delivery failed");
                metrics.set_digest_size(ranked.len().min(self.config.digest_size));
                format!("failed: {e}")
            }
        };

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            totals: metrics.snapshot(),
            delivery: delivery_text,
        };
        summary.log();

        RunReport { ranked, delivery, summary }
    }
}

/// Fetch and extract one source. Never fails: errors become a failed report.
async fn collect_source(
    transport: &dyn Fetch,
    extractor: &dyn Extractor,
    source: &SourceConfig,
) -> (Vec<CanonicalRecord>, SourceReport) {
    let started = Instant::now();
    let elapsed_ms = || started.elapsed().as_millis() as u64;

    let response = match transport.fetch(&source.url, &fetch_options(source.kind)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(source = %source.id, url = %source.url, error = %e, "Fetch failed, source skipped this run");
            let report = SourceReport {
                source: source.id.clone(),
                status: SourceStatus::Failed,
                path: None,
                http_status: None,
                records: 0,
                error: Some(e.to_string()),
                elapsed_ms: elapsed_ms(),
            };
            return (Vec::new(), report);
        }
    };

    if !response.is_success() {
        warn!(
            source = %source.id,
            url = %response.url,
            status = response.status,
            "Non-success status, extracting whatever came back"
        );
    }

    let extraction = extractor.extract(&response);
    if extraction.is_degraded() {
        warn!(
            source = %source.id,
            kind = %extractor.kind(),
            records = extraction.records.len(),
            "Extraction degraded"
        );
    }

    let report = SourceReport {
        source: source.id.clone(),
        status: SourceStatus::Ok,
        path: Some(extraction.path),
        http_status: Some(response.status),
        records: extraction.records.len(),
        error: None,
        elapsed_ms: elapsed_ms(),
    };
    (extraction.records, report)
}

fn fetch_options(kind: SourceKind) -> FetchOptions {
    let accept = match kind {
        SourceKind::SearchApi => "application/json",
        SourceKind::EmbeddedJson | SourceKind::CardHtml => "text/html,application/xhtml+xml",
    };
    FetchOptions {
        headers: vec![("Accept".to_string(), accept.to_string())],
    }
}
