// =============================================================================
// models.rs: THE SHAPES EVERYTHING GETS SQUEEZED INTO
// =============================================================================
//
// Product Hunt speaks Next.js, Algolia speaks JSON, bonus listing sites speak
// whatever their WordPress theme spoke the year it was installed. By the time
// anything leaves an extractor it has been hammered into a CanonicalRecord,
// and from that point on nobody downstream needs to know where it came from
// (apart from the `source` tag, which we keep for the digest).
//
// Records are built once and never edited. Scoring wraps them in a
// ScoredRecord instead of scribbling on them.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which extraction strategy a source needs. The orchestrator picks the
/// extractor from this, never from sniffing the response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Server-rendered HTML with a JSON payload inlined in a script tag.
    EmbeddedJson,
    /// A JSON search API.
    SearchApi,
    /// Server-rendered HTML made of repeated "card" blocks.
    CardHtml,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::EmbeddedJson => write!(f, "embedded-json"),
            SourceKind::SearchApi => write!(f, "search-api"),
            SourceKind::CardHtml => write!(f, "card-html"),
        }
    }
}

/// What sort of opportunity a record describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    /// A product or platform launch.
    Startup,
    /// A monetary signup offer.
    SignupBonus,
    #[default]
    Unspecified,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Startup => write!(f, "startup"),
            RecordKind::SignupBonus => write!(f, "signup-bonus"),
            RecordKind::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// The unit the pipeline operates on after extraction.
///
/// Always has a non-empty `name` and `url`: [`CanonicalRecord::new`] refuses
/// to build one otherwise, so extractors that cannot find either simply drop
/// the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub name: String,
    pub tagline: String,
    pub url: String,
    /// Origin tag, e.g. `ProductHunt` or `BankBonuses`.
    pub source: String,
    pub kind: RecordKind,
    /// Currency units. Only bonus-style offers carry one, and never negative.
    pub monetary_amount: Option<f64>,
    /// Votes or points. Zero when the source does not say.
    pub popularity: u64,
    /// Source-provided. Logged with each digest entry, never used for ordering.
    pub published_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    /// Build a record, trimming `name` and `url`. Returns `None` if either
    /// ends up empty.
    pub fn new(
        name: impl AsRef<str>,
        url: impl AsRef<str>,
        source: impl Into<String>,
        kind: RecordKind,
    ) -> Option<Self> {
        let name = name.as_ref().trim();
        let url = url.as_ref().trim();
        if name.is_empty() || url.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            tagline: String::new(),
            url: url.to_string(),
            source: source.into(),
            kind,
            monetary_amount: None,
            popularity: 0,
            published_at: None,
        })
    }

    pub fn with_tagline(mut self, tagline: impl AsRef<str>) -> Self {
        self.tagline = tagline.as_ref().trim().to_string();
        self
    }

    /// Attach a monetary amount. Negative, NaN and infinite amounts are
    /// treated as "no amount".
    pub fn with_amount(mut self, amount: f64) -> Self {
        self.monetary_amount = (amount.is_finite() && amount >= 0.0).then_some(amount);
        self
    }

    pub fn with_popularity(mut self, popularity: u64) -> Self {
        self.popularity = popularity;
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// The key two records are considered duplicates under.
    pub fn dedup_key(&self) -> String {
        normalize_name(&self.name)
    }
}

impl fmt::Display for CanonicalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] via {}", self.name, self.kind, self.source)?;
        if let Some(amount) = self.monetary_amount {
            write!(f, " ({})", format_amount(amount))?;
        }
        Ok(())
    }
}

/// A record plus everything scoring worked out about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: CanonicalRecord,
    pub score: f64,
    pub has_bonus_signal: bool,
    pub has_category_signal: bool,
}

/// Which parse path produced an extraction.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPath {
    /// The primary, structured parse worked.
    Clean,
    /// The primary parse failed (or missed things) and a lossy fallback
    /// supplied some or all of the records.
    Degraded,
}

impl fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionPath::Clean => write!(f, "clean"),
            ExtractionPath::Degraded => write!(f, "degraded"),
        }
    }
}

/// What one extractor got out of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub records: Vec<CanonicalRecord>,
    pub path: ExtractionPath,
}

impl Extraction {
    pub fn clean(records: Vec<CanonicalRecord>) -> Self {
        Self { records, path: ExtractionPath::Clean }
    }

    pub fn degraded(records: Vec<CanonicalRecord>) -> Self {
        Self { records, path: ExtractionPath::Degraded }
    }

    pub fn is_degraded(&self) -> bool {
        self.path == ExtractionPath::Degraded
    }
}

/// Case-folded, whitespace-trimmed name. `"  Foo "` and `"foo"` collide.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// `500.0` -> `$500`, `1500.0` -> `$1,500`, `12.5` -> `$12.50`.
pub fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if frac == 0 {
        format!("${grouped}")
    } else {
        format!("${grouped}.{frac:02}")
    }
}

// =============================================================================
// Raw source shapes
// =============================================================================
// Everything optional, because the sources owe us nothing.
// =============================================================================

/// HN Algolia search response. Hits stay raw so each one can fail on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoliaSearchResult {
    pub hits: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgoliaHit {
    pub title: Option<String>,
    pub url: Option<String>,
    pub points: Option<u64>,
    pub created_at: Option<String>,
    #[serde(rename = "objectID")]
    pub object_id: Option<String>,
}

/// A Product Hunt post node as it appears in `__NEXT_DATA__`.
#[derive(Debug, Clone, Deserialize)]
pub struct HomefeedNode {
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "votesCount")]
    pub votes_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_requires_name_and_url() {
        assert!(CanonicalRecord::new("  ", "https://x.test", "t", RecordKind::Startup).is_none());
        assert!(CanonicalRecord::new("Acme", "", "t", RecordKind::Startup).is_none());

        let record = CanonicalRecord::new("  Acme ", " https://x.test ", "t", RecordKind::Startup)
            .expect("valid record");
        assert_eq!(record.name, "Acme");
        assert_eq!(record.url, "https://x.test");
        assert_eq!(record.popularity, 0);
        assert_eq!(record.monetary_amount, None);
    }

    #[test]
    fn test_negative_amount_is_dropped() {
        let record = CanonicalRecord::new("Acme", "https://x.test", "t", RecordKind::SignupBonus)
            .unwrap()
            .with_amount(-5.0);
        assert_eq!(record.monetary_amount, None);

        let record = record.with_amount(f64::NAN);
        assert_eq!(record.monetary_amount, None);

        let record = record.with_amount(250.0);
        assert_eq!(record.monetary_amount, Some(250.0));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(500.0), "$500");
        assert_eq!(format_amount(1500.0), "$1,500");
        assert_eq!(format_amount(1_234_567.0), "$1,234,567");
        assert_eq!(format_amount(12.5), "$12.50");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Foo  "), normalize_name("foo"));
    }

    #[test]
    fn test_display() {
        let record = CanonicalRecord::new("Acme Bank", "https://x.test", "BankBonuses", RecordKind::SignupBonus)
            .unwrap()
            .with_amount(1500.0);
        assert_eq!(record.to_string(), "Acme Bank [signup-bonus] via BankBonuses ($1,500)");
    }
}
