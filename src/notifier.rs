// =============================================================================
// notifier.rs: THE LAST MILE
// =============================================================================
//
// Takes the ranked list, keeps the top few, and gets them in front of a
// human. With Telegram credentials that means one sendMessage call; without
// them it means stdout. Running without credentials is the normal way to try
// the monitor out, so it is an outcome, not an error.
//
// A failed send is reported back and logged by the caller. It never changes
// the ranking and it is never retried: the next run will send a fresh digest
// anyway.
// =============================================================================

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, TelegramConfig};
use crate::models::{format_amount, ScoredRecord};

const TELEGRAM_HEADER: &str = "🚀 *New Platforms Alert*";
const NO_TAGLINE: &str = "No tagline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Nothing was ranked, so nothing was rendered.
    NothingToSend,
    /// No channel configured; the digest went to stdout.
    LocalOutput { records: usize },
    /// The channel accepted the digest.
    Delivered { records: usize },
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::NothingToSend => write!(f, "nothing to send"),
            DeliveryOutcome::LocalOutput { records } => write!(f, "{records} records written to stdout"),
            DeliveryOutcome::Delivered { records } => write!(f, "{records} records delivered to Telegram"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Telegram rejected the digest with HTTP {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("could not reach Telegram: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Telegram did not answer within {0:?}")]
    Timeout(Duration),
}

/// Leading emoji of a digest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Carries a monetary amount.
    Money,
    /// Matched a bonus keyword.
    Gift,
    Launch,
}

impl Marker {
    pub fn for_record(scored: &ScoredRecord) -> Self {
        if positive_amount(scored).is_some() {
            Marker::Money
        } else if scored.has_bonus_signal {
            Marker::Gift
        } else {
            Marker::Launch
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Marker::Money => "💰",
            Marker::Gift => "🎁",
            Marker::Launch => "🚀",
        }
    }
}

/// A `$0` offer is shown like no offer at all.
fn positive_amount(scored: &ScoredRecord) -> Option<f64> {
    scored.record.monetary_amount.filter(|a| *a > 0.0)
}

/// `Acme Bank ($500)`, or just the name when there is no amount.
pub fn title(scored: &ScoredRecord) -> String {
    match positive_amount(scored) {
        Some(amount) => format!("{} ({})", scored.record.name, format_amount(amount)),
        None => scored.record.name.clone(),
    }
}

/// Plain-text digest, one block per record.
pub fn render_local(digest: &[ScoredRecord]) -> String {
    digest
        .iter()
        .map(|s| {
            let tagline = if s.record.tagline.is_empty() { NO_TAGLINE } else { &s.record.tagline };
            format!(
                "{} {}\n   {}\n   {}\n   Source: {} | Score: {:.1}",
                Marker::for_record(s).emoji(),
                title(s),
                tagline,
                s.record.url,
                s.record.source,
                s.score,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Telegram (legacy Markdown) digest, header included.
pub fn render_telegram(digest: &[ScoredRecord]) -> String {
    let blocks = digest
        .iter()
        .map(|s| {
            let tagline = if s.record.tagline.is_empty() { NO_TAGLINE } else { &s.record.tagline };
            format!(
                "{} {}\n├ {}\n├ Source: {}\n└ [Link]({})",
                Marker::for_record(s).emoji(),
                bold_markdown(&title(s)),
                escape_markdown(tagline),
                escape_markdown(&s.record.source),
                s.record.url,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{TELEGRAM_HEADER}\n\n{blocks}")
}

/// `text` in bold. Legacy Markdown takes no escapes inside an entity, so
/// every literal `*` is written between two bold runs as `\*`.
pub fn bold_markdown(text: &str) -> String {
    text.split('*')
        .map(|run| if run.is_empty() { String::new() } else { format!("*{run}*") })
        .collect::<Vec<_>>()
        .join("\\*")
}

/// Backslash the characters legacy Markdown treats as markup. Only valid
/// outside an entity.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub struct Notifier {
    client: reqwest::Client,
    telegram: TelegramConfig,
    digest_size: usize,
    timeout: Duration,
}

impl Notifier {
    pub fn new(config: &Config) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.transport.timeout)
            .build()
            .map_err(DeliveryError::Network)?;

        Ok(Self {
            client,
            telegram: config.telegram.clone(),
            digest_size: config.digest_size,
            timeout: config.transport.timeout,
        })
    }

    /// Send the top `digest_size` records wherever they should go.
    pub async fn deliver(&self, ranked: &[ScoredRecord]) -> Result<DeliveryOutcome, DeliveryError> {
        if ranked.is_empty() {
            info!("Nothing ranked, no digest this run");
            return Ok(DeliveryOutcome::NothingToSend);
        }
        let digest = &ranked[..ranked.len().min(self.digest_size)];
        for (rank, s) in digest.iter().enumerate() {
            debug!(
                rank = rank + 1,
                record = %s.record,
                score = s.score,
                published_at = ?s.record.published_at,
                "Digest entry"
            );
        }

        let Some((token, chat_id)) = self.telegram.credentials() else {
            info!(records = digest.len(), "Telegram not configured, printing digest");
            println!("\n📱 Results (Telegram not configured):\n");
            println!("{}\n", render_local(digest));
            return Ok(DeliveryOutcome::LocalOutput { records: digest.len() });
        };

        let endpoint = format!(
            "{}/bot{}/sendMessage",
            self.telegram.api_base.trim_end_matches('/'),
            token
        );
        let payload = json!({
            "chat_id": chat_id,
            "text": render_telegram(digest),
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        // The token is part of the URL, so it is stripped from any error.
        let response = self
            .client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description: describe_rejection(&body),
            });
        }

        debug!(status = status.as_u16(), records = digest.len(), "Telegram accepted digest");
        Ok(DeliveryOutcome::Delivered { records: digest.len() })
    }

    fn classify(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Network(err.without_url())
        }
    }
}

/// Telegram explains itself in `{"ok":false,"description":"..."}`.
fn describe_rejection(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("description")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
