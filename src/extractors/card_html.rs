// =============================================================================
// card_html.rs: BONUS LISTINGS, ONE CARD AT A TIME
// =============================================================================
//
// Bonus listing pages are rows of near-identical cards: a heading with the
// bank's name, a dollar figure somewhere, a blurb, a "learn more" link. No
// API, no embedded JSON, just markup that was last touched by a theme
// update. We work in two passes:
//
// 1. Parse the page and visit every element whose class list contains a
//    card token (`card`, `offer-card`, `bonus_card`, ...). Each card that
//    has both a name and a dollar amount at or above the threshold becomes
//    a record.
//
// 2. Take the visible text of the whole page, one line per block element,
//    and look for "<Name> Bonus $<n>" on each line. This picks up offers
//    that live in tables, lists or cards with a class name we did not
//    anticipate. Anything it recovers marks the extraction as degraded,
//    because the card layout clearly did not tell the whole story.
//
// A name only counts once per page, whichever pass saw it first.
// =============================================================================

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{element_lines, element_text, Extractor};
use crate::dedup::SeenNames;
use crate::models::{CanonicalRecord, Extraction, RecordKind, SourceKind};
use crate::transport::RawResponse;

static CLASSED: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[class]").expect("class selector is valid"));

static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").expect("heading selector is valid"));

static TITLE_CLASS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[class*=title]").expect("title selector is valid"));

static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").expect("paragraph selector is valid"));

static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("link selector is valid"));

/// `$500`, `$ 1,500`, `$2,000.00`.
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?").expect("amount pattern is valid")
});

/// "Acme Bank Bonus $500" on one line of de-tagged text. Up to six
/// capitalised words.
static PLAIN_OFFER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([A-Z][\w&'.\-]*(?:[ \t]+[A-Z0-9][\w&'.\-]*){0,5})[ \t]+Bonus:?[ \t]*\$[ \t]?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?",
    )
    .expect("plain offer pattern is valid")
});

pub struct CardHtmlExtractor {
    tag: String,
    min_bonus: f64,
    max_items: usize,
}

impl CardHtmlExtractor {
    pub fn new(tag: impl Into<String>, min_bonus: f64, max_items: usize) -> Self {
        Self { tag: tag.into(), min_bonus, max_items }
    }

    fn card_record(&self, card: ElementRef<'_>, page_url: &str) -> Option<CanonicalRecord> {
        let amount = AMOUNT.captures(&element_text(card)).and_then(|c| parse_amount(&c))?;
        if amount < self.min_bonus {
            return None;
        }

        let name = first_text(card, &HEADING).or_else(|| first_text(card, &TITLE_CLASS))?;
        let tagline = first_text(card, &PARAGRAPH).unwrap_or_default();
        let url = first_link(card, page_url).unwrap_or_else(|| page_url.to_string());

        let record = CanonicalRecord::new(name, url, self.tag.clone(), RecordKind::SignupBonus)?
            .with_tagline(tagline)
            .with_amount(amount);
        Some(record)
    }

    fn plain_text_records(&self, text: &str, page_url: &str) -> Vec<CanonicalRecord> {
        PLAIN_OFFER
            .captures_iter(text)
            .filter_map(|caps| {
                let amount = parse_amount_parts(caps.get(2)?.as_str(), caps.get(3).map(|m| m.as_str()))?;
                (amount >= self.min_bonus).then_some(())?;
                CanonicalRecord::new(&caps[1], page_url, self.tag.clone(), RecordKind::SignupBonus)
                    .map(|r| r.with_amount(amount))
            })
            .collect()
    }
}

impl Extractor for CardHtmlExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::CardHtml
    }

    fn extract(&self, response: &RawResponse) -> Extraction {
        let document = Html::parse_document(&response.body);
        let text = element_lines(document.root_element());

        // No dollar sign anywhere means no offer anywhere.
        if memchr::memchr(b'$', text.as_bytes()).is_none() {
            debug!(source = %self.tag, "No currency amounts on page");
            return Extraction::clean(Vec::new());
        }

        let mut seen = SeenNames::new();
        let mut records = Vec::new();

        let cards: Vec<ElementRef<'_>> = document.select(&CLASSED).filter(|e| is_card(e)).collect();
        for card in &cards {
            if let Some(record) = self.card_record(*card, &response.url) {
                if seen.check_and_insert(&record) {
                    records.push(record);
                }
            }
        }
        let from_cards = records.len();

        for record in self.plain_text_records(&text, &response.url) {
            if seen.check_and_insert(&record) {
                records.push(record);
            }
        }
        let recovered = records.len() - from_cards;
        records.truncate(self.max_items);

        if recovered > 0 {
            warn!(
                source = %self.tag,
                cards = cards.len(),
                from_cards,
                recovered,
                "Card layout missed offers, recovered them from plain text"
            );
            Extraction::degraded(records)
        } else {
            debug!(source = %self.tag, cards = cards.len(), records = records.len(), "Cards parsed");
            Extraction::clean(records)
        }
    }
}

/// `card`, `offer-card`, `Bonus_Card`; not `card-body` or `cards`.
fn is_card(element: &ElementRef<'_>) -> bool {
    element.value().classes().any(|class| {
        let class = class.to_ascii_lowercase();
        class == "card" || class.ends_with("-card") || class.ends_with("_card")
    })
}

/// Text of the first element under `card` matching `selector`, if non-empty.
fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector).map(element_text).find(|t| !t.is_empty())
}

fn first_link(card: ElementRef<'_>, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok();
    card.select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.starts_with('#') && !href.to_lowercase().starts_with("javascript:"))
        .find_map(|href| match &base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        })
}

fn parse_amount(caps: &Captures<'_>) -> Option<f64> {
    parse_amount_parts(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()))
}

/// `"1,500"` + `Some("50")` -> 1500.50
fn parse_amount_parts(whole: &str, frac: Option<&str>) -> Option<f64> {
    let whole: String = whole.chars().filter(|c| *c != ',').collect();
    let number = match frac {
        Some(frac) => format!("{whole}.{frac}"),
        None => whole,
    };
    number.parse().ok()
}
