// =============================================================================
// config.rs: EVERY KNOB IN ONE PLACE
// =============================================================================
//
// Keyword lists, weights, thresholds, source URLs and the Telegram
// credentials all live in one Config value. It is built once at startup,
// validated once, wrapped in an Arc and handed to every component. Nothing
// downstream reads the environment on its own.
//
// Defaults are what the monitor has always shipped with, plus "that looks about
// right". Every one of them can be overridden with a PLATFORM_MONITOR_*
// variable (or TELEGRAM_* for the bot credentials).
// =============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::models::SourceKind;

pub const PRODUCT_HUNT: &str = "product_hunt";
pub const HACKER_NEWS: &str = "hacker_news";
pub const BANK_BONUSES: &str = "bank_bonuses";

const DEFAULT_SOURCES: &str = "product_hunt,hacker_news,bank_bonuses";

const DEFAULT_BONUS_KEYWORDS: &str =
    "free,bonus,reward,early,beta,credits,lifetime,discount,launch,promo,giveaway";

const DEFAULT_CATEGORIES: &str =
    "fintech,finance,crypto,web3,defi,productivity,saas,marketplace,tools";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; PlatformMonitor/1.0)";

/// Configuration problems that stop the pipeline before it starts.
/// Distinct from anything that can go wrong per source at runtime.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no sources configured; set PLATFORM_MONITOR_SOURCES to at least one of product_hunt, hacker_news, bank_bonuses")]
    NoSources,

    #[error("unknown source '{0}' (known: product_hunt, hacker_news, bank_bonuses)")]
    UnknownSource(String),

    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("{name} must be a finite number greater than zero (got {value})")]
    InvalidDivisor { name: &'static str, value: f64 },

    #[error("digest size must be at least 1")]
    EmptyDigest,

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

/// One source the orchestrator will visit.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Stable identifier, e.g. `product_hunt`.
    pub id: String,
    /// Tag stamped on every record from this source, e.g. `ProductHunt`.
    pub tag: String,
    pub kind: SourceKind,
    pub url: String,
    /// Upper bound on records this source contributes to one run.
    pub max_items: usize,
    /// Title marker the search-API extractor filters on and strips.
    pub title_marker: Option<String>,
    /// JSON pointer to the post edges, for when the embedded payload moves.
    pub items_pointer: Option<String>,
}

/// Weights and vocabularies for the scoring engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub bonus_keywords: Vec<String>,
    pub category_keywords: Vec<String>,
    pub bonus_weight: f64,
    pub category_weight: f64,
    pub amount_divisor: f64,
    pub amount_cap: f64,
    pub popularity_divisor: f64,
    pub popularity_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bonus_keywords: parse_keywords(DEFAULT_BONUS_KEYWORDS),
            category_keywords: parse_keywords(DEFAULT_CATEGORIES),
            bonus_weight: 10.0,
            category_weight: 5.0,
            amount_divisor: 100.0,
            amount_cap: 10.0,
            popularity_divisor: 10.0,
            popularity_cap: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Bounds every individual request, redirect hops included.
    pub timeout: Duration,
    pub max_redirects: u32,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    /// Token and chat id, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: None,
            chat_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Visited in this order, which is also the "first occurrence wins"
    /// order for deduplication.
    pub sources: Vec<SourceConfig>,
    pub scoring: ScoringConfig,
    /// Card offers below this amount are ignored.
    pub min_bonus: f64,
    /// How many ranked records make it into the digest.
    pub digest_size: usize,
    pub transport: TransportConfig,
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load `.env` if there is one, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing keys fall back to
    /// defaults, unparsable numbers fall back with a warning.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let hn_query = get("PLATFORM_MONITOR_HN_QUERY", "Launch HN");
        let hn_base = get(
            "PLATFORM_MONITOR_HN_SEARCH_BASE",
            "https://hn.algolia.com/api/v1/search",
        );

        let mut sources = Vec::new();
        for id in get("PLATFORM_MONITOR_SOURCES", DEFAULT_SOURCES)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let source = match id {
                PRODUCT_HUNT => SourceConfig {
                    id: PRODUCT_HUNT.to_string(),
                    tag: "ProductHunt".to_string(),
                    kind: SourceKind::EmbeddedJson,
                    url: get("PLATFORM_MONITOR_PRODUCT_HUNT_URL", "https://www.producthunt.com/"),
                    max_items: 20,
                    title_marker: None,
                    items_pointer: lookup("PLATFORM_MONITOR_PRODUCT_HUNT_ITEMS_POINTER")
                        .map(|p| p.trim().to_string())
                        .filter(|p| p.starts_with('/')),
                },
                HACKER_NEWS => SourceConfig {
                    id: HACKER_NEWS.to_string(),
                    tag: "HackerNews".to_string(),
                    kind: SourceKind::SearchApi,
                    url: format!(
                        "{}?query={}&tags=story",
                        hn_base.trim_end_matches('/'),
                        urlencoding::encode(&hn_query)
                    ),
                    max_items: 10,
                    title_marker: Some(hn_query.clone()),
                    items_pointer: None,
                },
                BANK_BONUSES => SourceConfig {
                    id: BANK_BONUSES.to_string(),
                    tag: "BankBonuses".to_string(),
                    kind: SourceKind::CardHtml,
                    url: get(
                        "PLATFORM_MONITOR_BANK_BONUS_URL",
                        "https://www.doctorofcredit.com/best-bank-account-bonuses/",
                    ),
                    max_items: 25,
                    title_marker: None,
                    items_pointer: None,
                },
                other => return Err(ConfigError::UnknownSource(other.to_string())),
            };
            sources.push(source);
        }

        let defaults = ScoringConfig::default();
        let scoring = ScoringConfig {
            bonus_keywords: parse_keywords(&get(
                "PLATFORM_MONITOR_BONUS_KEYWORDS",
                DEFAULT_BONUS_KEYWORDS,
            )),
            category_keywords: parse_keywords(&get(
                "PLATFORM_MONITOR_CATEGORIES",
                DEFAULT_CATEGORIES,
            )),
            bonus_weight: parse_or(&lookup, "PLATFORM_MONITOR_BONUS_WEIGHT", defaults.bonus_weight),
            category_weight: parse_or(
                &lookup,
                "PLATFORM_MONITOR_CATEGORY_WEIGHT",
                defaults.category_weight,
            ),
            amount_divisor: parse_or(
                &lookup,
                "PLATFORM_MONITOR_AMOUNT_DIVISOR",
                defaults.amount_divisor,
            ),
            amount_cap: parse_or(&lookup, "PLATFORM_MONITOR_AMOUNT_CAP", defaults.amount_cap),
            popularity_divisor: parse_or(
                &lookup,
                "PLATFORM_MONITOR_POPULARITY_DIVISOR",
                defaults.popularity_divisor,
            ),
            popularity_cap: parse_or(
                &lookup,
                "PLATFORM_MONITOR_POPULARITY_CAP",
                defaults.popularity_cap,
            ),
        };

        let transport_defaults = TransportConfig::default();
        let transport = TransportConfig {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "PLATFORM_MONITOR_TIMEOUT_SECS",
                transport_defaults.timeout.as_secs(),
            )),
            max_redirects: parse_or(
                &lookup,
                "PLATFORM_MONITOR_MAX_REDIRECTS",
                transport_defaults.max_redirects,
            ),
            user_agent: get("PLATFORM_MONITOR_USER_AGENT", DEFAULT_USER_AGENT),
        };

        let telegram = TelegramConfig {
            api_base: get("PLATFORM_MONITOR_TELEGRAM_API_BASE", "https://api.telegram.org"),
            bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|v| !v.trim().is_empty()),
            chat_id: lookup("TELEGRAM_CHAT_ID").filter(|v| !v.trim().is_empty()),
        };

        let config = Config {
            sources,
            scoring,
            min_bonus: parse_or(&lookup, "PLATFORM_MONITOR_MIN_BONUS", 100.0),
            digest_size: parse_or(&lookup, "PLATFORM_MONITOR_DIGEST_SIZE", 5),
            transport,
            telegram,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.digest_size == 0 {
            return Err(ConfigError::EmptyDigest);
        }
        if self.transport.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        let s = &self.scoring;
        for (name, value) in [
            ("bonus_weight", s.bonus_weight),
            ("category_weight", s.category_weight),
            ("amount_cap", s.amount_cap),
            ("popularity_cap", s.popularity_cap),
            ("min_bonus", self.min_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }
        for (name, value) in [
            ("amount_divisor", s.amount_divisor),
            ("popularity_divisor", s.popularity_divisor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidDivisor { name, value });
            }
        }

        Ok(())
    }
}

/// Comma-separated list, lowercased, blanks dropped.
fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, fallback = %default, "Unparsable config value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_cover_all_three_sources() {
        let config = Config::from_lookup(lookup_from(&[])).expect("defaults are valid");
        let ids: Vec<_> = config.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![PRODUCT_HUNT, HACKER_NEWS, BANK_BONUSES]);
        assert_eq!(config.digest_size, 5);
        assert_eq!(config.transport.max_redirects, 5);
        assert!(config.telegram.credentials().is_none());
        assert!(config.scoring.bonus_keywords.contains(&"giveaway".to_string()));
    }

    #[test]
    fn test_hn_url_is_encoded_and_marker_kept() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        let hn = config.sources.iter().find(|s| s.id == HACKER_NEWS).unwrap();
        assert_eq!(
            hn.url,
            "https://hn.algolia.com/api/v1/search?query=Launch%20HN&tags=story"
        );
        assert_eq!(hn.title_marker.as_deref(), Some("Launch HN"));
    }

    #[test]
    fn test_items_pointer_override() {
        let config = Config::from_lookup(lookup_from(&[(
            "PLATFORM_MONITOR_PRODUCT_HUNT_ITEMS_POINTER",
            " /props/apolloState/posts ",
        )]))
        .unwrap();
        assert_eq!(config.sources[0].items_pointer.as_deref(), Some("/props/apolloState/posts"));

        let config = Config::from_lookup(lookup_from(&[("PLATFORM_MONITOR_PRODUCT_HUNT_ITEMS_POINTER", "posts")]))
            .unwrap();
        assert_eq!(config.sources[0].items_pointer, None);
    }

    #[test]
    fn test_no_sources_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[("PLATFORM_MONITOR_SOURCES", " , ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::NoSources);
    }

    #[test]
    fn test_unknown_source_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[("PLATFORM_MONITOR_SOURCES", "myspace")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownSource("myspace".to_string()));
    }

    #[test]
    fn test_zero_divisor_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PLATFORM_MONITOR_POPULARITY_DIVISOR", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDivisor { name: "popularity_divisor", .. }));
    }

    #[test]
    fn test_garbage_numbers_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PLATFORM_MONITOR_DIGEST_SIZE", "lots"),
            ("PLATFORM_MONITOR_MIN_BONUS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.digest_size, 5);
        assert_eq!(config.min_bonus, 50.0);
    }

    #[test]
    fn test_keywords_are_lowercased_and_trimmed() {
        let config = Config::from_lookup(lookup_from(&[(
            "PLATFORM_MONITOR_BONUS_KEYWORDS",
            " Cashback , ,REFERRAL",
        )]))
        .unwrap();
        assert_eq!(config.scoring.bonus_keywords, vec!["cashback", "referral"]);
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "  "),
        ]))
        .unwrap();
        assert!(config.telegram.credentials().is_none());
    }
}
