// =============================================================================
// search_api.rs: "LAUNCH HN:" AND NOTHING ELSE
// =============================================================================
//
// The HN Algolia search endpoint returns JSON (a luxury). We ask it for the
// marker, then filter again ourselves because full-text search is generous
// about what counts as a match: a story whose URL or text mentions the
// marker comes back even when its title does not. Only the title counts
// here, and anywhere in the title will do.
//
// Hits are decoded one at a time. A single hit with a field of the wrong
// type costs that hit, not the whole page.
// =============================================================================

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::Extractor;
use crate::models::{AlgoliaHit, AlgoliaSearchResult, CanonicalRecord, Extraction, RecordKind, SourceKind};
use crate::transport::RawResponse;

const ITEM_URL: &str = "https://news.ycombinator.com/item?id=";

pub struct SearchApiExtractor {
    tag: String,
    /// Lowercased marker for the containment check.
    marker: String,
    /// `^<marker>:?\s*`, case-insensitive. `None` when the marker is empty.
    prefix: Option<Regex>,
    max_items: usize,
}

impl SearchApiExtractor {
    pub fn new(tag: impl Into<String>, marker: impl AsRef<str>, max_items: usize) -> Self {
        let marker = marker.as_ref().trim();
        let prefix = (!marker.is_empty())
            .then(|| {
                RegexBuilder::new(&format!(r"^\s*{}\s*:?\s*", regex::escape(marker)))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .flatten();

        Self {
            tag: tag.into(),
            marker: marker.to_lowercase(),
            prefix,
            max_items,
        }
    }

    fn hit_to_record(&self, hit: AlgoliaHit) -> Option<CanonicalRecord> {
        let title = hit.title?;
        if !title.to_lowercase().contains(&self.marker) {
            return None;
        }

        let name = match &self.prefix {
            Some(prefix) => prefix.replace(&title, "").into_owned(),
            None => title,
        };

        let url = hit
            .url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| hit.object_id.map(|id| format!("{ITEM_URL}{id}")))?;

        let published_at = hit
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let record = CanonicalRecord::new(name, url, self.tag.clone(), RecordKind::Startup)?
            .with_popularity(hit.points.unwrap_or(0))
            .with_published_at(published_at);
        Some(record)
    }
}

impl Extractor for SearchApiExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::SearchApi
    }

    fn extract(&self, response: &RawResponse) -> Extraction {
        let parsed: AlgoliaSearchResult = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(source = %self.tag, error = %e, "Search response is not JSON, nothing to extract");
                return Extraction::degraded(Vec::new());
            }
        };

        let hits = parsed.hits.unwrap_or_default();
        let total = hits.len();
        let mut malformed = 0usize;
        let records: Vec<_> = hits
            .into_iter()
            .filter_map(|hit| match serde_json::from_value::<AlgoliaHit>(hit) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    malformed += 1;
                    debug!(source = %self.tag, error = %e, "Skipping malformed hit");
                    None
                }
            })
            .filter_map(|hit| self.hit_to_record(hit))
            .take(self.max_items)
            .collect();

        debug!(source = %self.tag, hits = total, malformed, kept = records.len(), "Search results filtered");
        Extraction::clean(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionPath;

    fn extractor() -> SearchApiExtractor {
        SearchApiExtractor::new("HackerNews", "Launch HN", 10)
    }

    fn resp(body: &str) -> RawResponse {
        RawResponse::ok("https://hn.algolia.com/api/v1/search", body)
    }

    #[test]
    fn test_filters_and_strips_marker() {
        let body = r#"{"hits":[
            {"title":"Launch HN: Ledgerly (YC W25) - Bookkeeping for freelancers","url":"https://ledgerly.test","points":120,"created_at":"2025-01-15T16:00:00.000Z","objectID":"1"},
            {"title":"Ask HN: Is launching hard?","points":900,"objectID":"2"},
            {"title":"launch hn:   Quiet Co","url":"","points":null,"objectID":"3"},
            {"url":"https://untitled.test","objectID":"4"}
        ]}"#;
        let extraction = extractor().extract(&resp(body));

        assert_eq!(extraction.path, ExtractionPath::Clean);
        assert_eq!(extraction.records.len(), 2);

        let first = &extraction.records[0];
        assert_eq!(first.name, "Ledgerly (YC W25) - Bookkeeping for freelancers");
        assert_eq!(first.url, "https://ledgerly.test");
        assert_eq!(first.popularity, 120);
        assert_eq!(
            first.published_at.map(|d| d.to_rfc3339()),
            Some("2025-01-15T16:00:00+00:00".to_string())
        );

        let second = &extraction.records[1];
        assert_eq!(second.name, "Quiet Co");
        assert_eq!(second.url, "https://news.ycombinator.com/item?id=3");
        assert_eq!(second.popularity, 0);
    }

    #[test]
    fn test_non_json_yields_nothing() {
        for body in ["<html>rate limited</html>", "", r#"{"hits":[{"title":"Launch HN: Trunc"#] {
            let extraction = extractor().extract(&resp(body));
            assert!(extraction.records.is_empty(), "body {body:?}");
            assert!(extraction.is_degraded());
        }
    }

    #[test]
    fn test_missing_hits_is_empty_not_error() {
        let extraction = extractor().extract(&resp(r#"{"nbHits":0}"#));
        assert!(extraction.records.is_empty());
        assert!(!extraction.is_degraded());
    }

    #[test]
    fn test_title_mentioning_marker_anywhere_is_kept() {
        let body = r#"{"hits":[{"title":"Why every Launch HN looks the same","objectID":"9"}]}"#;
        let extraction = extractor().extract(&resp(body));
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].name, "Why every Launch HN looks the same");
    }

    #[test]
    fn test_one_malformed_hit_costs_only_itself() {
        let body = r#"{"hits":[
            {"title":"Launch HN: Good One","points":12,"objectID":"1"},
            {"title":"Launch HN: Stringly","points":"12","objectID":"2"},
            {"title":["Launch HN: Array"],"objectID":"3"},
            "not even an object",
            {"title":"Launch HN: Good Two","objectID":"4"}
        ]}"#;
        let extraction = extractor().extract(&resp(body));

        assert_eq!(extraction.path, ExtractionPath::Clean);
        let names: Vec<_> = extraction.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Good One", "Good Two"]);
        assert_eq!(extraction.records[0].popularity, 12);
    }

    #[test]
    fn test_hit_without_any_url_is_dropped() {
        let extraction = extractor().extract(&resp(r#"{"hits":[{"title":"Launch HN: Ghost"}]}"#));
        assert!(extraction.records.is_empty());
    }

    #[test]
    fn test_cap() {
        let hits: Vec<String> = (0..15)
            .map(|i| format!(r#"{{"title":"Launch HN: P{i}","objectID":"{i}"}}"#))
            .collect();
        let body = format!(r#"{{"hits":[{}]}}"#, hits.join(","));
        assert_eq!(extractor().extract(&resp(&body)).records.len(), 10);
    }
}
