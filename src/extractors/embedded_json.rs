// =============================================================================
// embedded_json.rs: READING NEXT.JS PAGES FROM THE INSIDE
// =============================================================================
//
// Product Hunt renders its home page on the server and inlines the whole
// initial state as JSON:
//
//   <script id="__NEXT_DATA__" type="application/json">{"props":{...}}</script>
//
// The posts live at props.initialState.homefeed.edges[].node. That path is
// not a contract, it is an accident of their current frontend, and it will
// move one day. When it does we fall back to grepping `"name":"..."` out of
// the raw page. That produces bare names with no tagline, no votes and the
// site root as the link. It is a worse digest, but it is still a digest.
// =============================================================================

use serde_json::Value;
use std::sync::LazyLock;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::Extractor;
use crate::dedup::SeenNames;
use crate::models::{CanonicalRecord, Extraction, HomefeedNode, RecordKind, SourceKind};
use crate::transport::RawResponse;

const NEXT_DATA_ID: &[u8] = b"id=\"__NEXT_DATA__\"";
const SCRIPT_CLOSE: &[u8] = b"</script>";
const ITEMS_POINTER: &str = "/props/initialState/homefeed/edges";

static NAME_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""name"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("name field pattern is valid")
});

pub struct EmbeddedJsonExtractor {
    tag: String,
    /// Scheme + host of the page, e.g. `https://www.producthunt.com`.
    site_root: String,
    max_items: usize,
    items_pointer: String,
}

impl EmbeddedJsonExtractor {
    pub fn new(tag: impl Into<String>, page_url: &str, max_items: usize) -> Self {
        let site_root = Url::parse(page_url)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .filter(|origin| origin != "null")
            .unwrap_or_else(|| page_url.trim_end_matches('/').to_string());

        Self {
            tag: tag.into(),
            site_root,
            max_items,
            items_pointer: ITEMS_POINTER.to_string(),
        }
    }

    /// Walk a different JSON pointer to the list of edges.
    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = pointer.into();
        self
    }

    fn parse_payload(&self, payload: &str) -> Option<Vec<CanonicalRecord>> {
        let data: Value = serde_json::from_str(payload)
            .map_err(|e| debug!(source = %self.tag, error = %e, "Embedded payload is not valid JSON"))
            .ok()?;
        let edges = data.pointer(&self.items_pointer)?.as_array()?;

        let records = edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .filter_map(|node| serde_json::from_value::<HomefeedNode>(node.clone()).ok())
            .filter_map(|node| self.node_to_record(node))
            .take(self.max_items)
            .collect();
        Some(records)
    }

    fn node_to_record(&self, node: HomefeedNode) -> Option<CanonicalRecord> {
        let slug = node.slug.filter(|s| !s.trim().is_empty())?;
        let url = format!("{}/posts/{}", self.site_root, slug.trim());
        let record = CanonicalRecord::new(node.name?, url, self.tag.clone(), RecordKind::Startup)?
            .with_tagline(node.tagline.unwrap_or_default())
            .with_popularity(node.votes_count.unwrap_or(0));
        Some(record)
    }

    fn scrape_names(&self, html: &str) -> Vec<CanonicalRecord> {
        let mut seen = SeenNames::new();
        NAME_FIELD
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| decode_json_string(m.as_str()))
            .filter_map(|name| {
                CanonicalRecord::new(name, &self.site_root, self.tag.clone(), RecordKind::Startup)
            })
            .filter(|record| seen.check_and_insert(record))
            .take(self.max_items)
            .collect()
    }
}

impl Extractor for EmbeddedJsonExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::EmbeddedJson
    }

    fn extract(&self, response: &RawResponse) -> Extraction {
        let html = response.body.as_str();

        if let Some(records) = locate_payload(html).and_then(|p| self.parse_payload(p)) {
            debug!(source = %self.tag, records = records.len(), "Embedded JSON parsed cleanly");
            return Extraction::clean(records);
        }

        let records = self.scrape_names(html);
        warn!(
            source = %self.tag,
            pointer = %self.items_pointer,
            records = records.len(),
            "Embedded JSON missing or reshaped, fell back to name scraping"
        );
        Extraction::degraded(records)
    }
}

/// The text between `<script id="__NEXT_DATA__" ...>` and its `</script>`.
fn locate_payload(html: &str) -> Option<&str> {
    let bytes = html.as_bytes();
    let id_at = memchr::memmem::find(bytes, NEXT_DATA_ID)?;
    let open_end = id_at + memchr::memchr(b'>', &bytes[id_at..])? + 1;
    let close_at = open_end + memchr::memmem::find(&bytes[open_end..], SCRIPT_CLOSE)?;
    // Both offsets sit on ASCII bytes, so they are char boundaries.
    html.get(open_end..close_at)
}

/// `Café \"Bar\"` -> `Café "Bar"`. Falls back to the raw text.
fn decode_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}
