// =============================================================================
// extractors/mod.rs: ONE INTERFACE, THREE DIALECTS
// =============================================================================
//
// Every source speaks its own dialect. Each extractor translates exactly one
// of them into CanonicalRecords and nothing else: no network, no scoring, no
// shared state. Give it a response, get back records plus a tag saying
// whether the clean parse worked or the lossy fallback had to step in.
//
// None of them ever fail. Markup changes are a matter of when, not if, and a
// layout tweak on one site must not take the whole run down with it. Bad
// input means fewer records, never an error.
//
// New source? New Extractor impl and a new SourceKind variant. Do not grow
// an if-ladder inside an existing one.
// =============================================================================

pub mod card_html;
pub mod embedded_json;
pub mod search_api;

use std::sync::Arc;

use scraper::{ElementRef, Node};

use crate::config::SourceConfig;
use crate::models::{Extraction, SourceKind};
use crate::transport::RawResponse;

pub use card_html::CardHtmlExtractor;
pub use embedded_json::EmbeddedJsonExtractor;
pub use search_api::SearchApiExtractor;

pub trait Extractor: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Turn one raw response into records. Never fails; see the module docs.
    fn extract(&self, response: &RawResponse) -> Extraction;
}

/// The extractor a configured source needs. Chosen by the source's kind,
/// not by looking at what came back.
pub fn for_source(source: &SourceConfig, min_bonus: f64) -> Arc<dyn Extractor> {
    match source.kind {
        SourceKind::EmbeddedJson => {
            let extractor = EmbeddedJsonExtractor::new(source.tag.clone(), &source.url, source.max_items);
            match &source.items_pointer {
                Some(pointer) => Arc::new(extractor.with_items_pointer(pointer.clone())),
                None => Arc::new(extractor),
            }
        }
        SourceKind::SearchApi => Arc::new(SearchApiExtractor::new(
            source.tag.clone(),
            source.title_marker.clone().unwrap_or_default(),
            source.max_items,
        )),
        SourceKind::CardHtml => Arc::new(CardHtmlExtractor::new(
            source.tag.clone(),
            min_bonus,
            source.max_items,
        )),
    }
}

// =============================================================================
// Shared HTML helpers
// =============================================================================

/// Elements whose boundaries end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "dl", "dt", "dd", "tr", "td",
    "th", "table", "thead", "tbody", "section", "article", "aside", "main", "nav", "header",
    "footer", "blockquote", "br", "hr",
];

/// Past this depth the rest of a subtree is flattened with `ElementRef::text`.
const MAX_DEPTH: usize = 128;

/// Visible text of `element`, one line per block, whitespace collapsed,
/// blank lines dropped. Entities are already decoded by the parser.
pub(crate) fn element_lines(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, 0, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`element_lines`] on a single line.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element_lines(element).replace('\n', " ")
}

fn push_text(element: ElementRef<'_>, depth: usize, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "noscript" | "template") {
                    continue;
                }
                let Some(child) = ElementRef::wrap(child) else { continue };
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if depth < MAX_DEPTH {
                    push_text(child, depth + 1, out);
                } else {
                    out.extend(child.text());
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}
