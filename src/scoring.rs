// =============================================================================
// scoring.rs: TURNING FOUR KINDS OF EVIDENCE INTO ONE NUMBER
// =============================================================================
//
// A record can be interesting for different reasons: it pays money, it says
// "free credits", it is in a category we care about, or a lot of people
// upvoted it. Each signal contributes a bounded amount:
//
//   score = min(amount / amount_divisor, amount_cap)
//         + bonus_weight    if a bonus keyword matched (or there is an amount)
//         + category_weight if a category keyword matched
//         + min(popularity / popularity_divisor, popularity_cap)
//
// Keywords are matched with one Aho-Corasick automaton per vocabulary, built
// once when the engine is created and run over "name tagline" in a single
// pass. Records are scored in parallel with rayon; the collect keeps input
// order so the stable sort afterwards leaves ties exactly where they were.
//
// Anything scoring zero has shown no signal at all and is not ranked.
// =============================================================================

use aho_corasick::AhoCorasick;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::models::{CanonicalRecord, ScoredRecord};

pub struct ScoringEngine {
    bonus: Option<AhoCorasick>,
    category: Option<AhoCorasick>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            bonus: build_automaton("bonus", &config.bonus_keywords),
            category: build_automaton("category", &config.category_keywords),
            config: config.clone(),
        }
    }

    /// Score a single record. Pure: same record, same answer.
    pub fn score_one(&self, record: &CanonicalRecord) -> ScoredRecord {
        let text = format!("{} {}", record.name, record.tagline).to_lowercase();
        let c = &self.config;

        let amount = record.monetary_amount.filter(|a| *a > 0.0);
        let has_bonus_signal = amount.is_some() || matches(&self.bonus, &text);
        let has_category_signal = matches(&self.category, &text);

        let mut score = 0.0;
        if let Some(amount) = amount {
            score += (amount / c.amount_divisor).min(c.amount_cap);
        }
        if has_bonus_signal {
            score += c.bonus_weight;
        }
        if has_category_signal {
            score += c.category_weight;
        }
        score += (record.popularity as f64 / c.popularity_divisor).min(c.popularity_cap);

        ScoredRecord {
            record: record.clone(),
            score,
            has_bonus_signal,
            has_category_signal,
        }
    }

    /// Score every record, drop the ones with no signal, and rank the rest
    /// highest first. Equal scores keep their input order.
    pub fn score(&self, records: &[CanonicalRecord]) -> Vec<ScoredRecord> {
        let mut ranked: Vec<ScoredRecord> = records
            .par_iter()
            .map(|record| self.score_one(record))
            .filter(|scored| scored.score > 0.0)
            .collect();

        // `sort_by` is stable.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            scored = records.len(),
            ranked = ranked.len(),
            top = ranked.first().map(|r| format!("{:.1}", r.score)).unwrap_or_default(),
            "Scoring complete"
        );
        ranked
    }
}

fn build_automaton(vocabulary: &str, keywords: &[String]) -> Option<AhoCorasick> {
    let patterns: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if patterns.is_empty() {
        return None;
    }

    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&patterns)
        .map_err(|e| warn!(vocabulary, error = %e, "Keyword automaton failed to build, signal disabled"))
        .ok()
}

fn matches(automaton: &Option<AhoCorasick>, text: &str) -> bool {
    automaton.as_ref().is_some_and(|ac| ac.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKind;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(&ScoringConfig::default())
    }

    fn record(name: &str, tagline: &str) -> CanonicalRecord {
        CanonicalRecord::new(name, "https://x.test", "test", RecordKind::Startup)
            .unwrap()
            .with_tagline(tagline)
    }

    #[test]
    fn test_no_signal_means_not_ranked() {
        let engine = engine();
        let boring = record("Widget", "A thing that does stuff");
        assert_eq!(engine.score_one(&boring).score, 0.0);
        assert!(engine.score(&[boring]).is_empty());
    }

    #[test]
    fn test_each_signal_contributes() {
        let engine = engine();

        let bonus = engine.score_one(&record("Orbit", "Get FREE credits"));
        assert!(bonus.has_bonus_signal);
        assert!(!bonus.has_category_signal);
        assert_eq!(bonus.score, 10.0);

        let category = engine.score_one(&record("Ledgerly", "Fintech for accountants"));
        assert!(category.has_category_signal);
        assert_eq!(category.score, 5.0);

        let popular = engine.score_one(&record("Quiet", "Nothing special").with_popularity(30));
        assert_eq!(popular.score, 3.0);

        let viral = engine.score_one(&record("Loud", "Nothing special").with_popularity(10_000));
        assert_eq!(viral.score, 5.0);
    }

    #[test]
    fn test_amount_implies_bonus_signal_and_is_capped() {
        let engine = engine();

        let small = record("Acme Bank", "").with_amount(300.0);
        let scored = engine.score_one(&small);
        assert!(scored.has_bonus_signal);
        assert_eq!(scored.score, 3.0 + 10.0);

        let huge = record("Mega Bank", "").with_amount(50_000.0);
        assert_eq!(engine.score_one(&huge).score, 10.0 + 10.0);

        let zero = record("Zero Bank", "").with_amount(0.0);
        assert!(!engine.score_one(&zero).has_bonus_signal);
    }

    #[test]
    fn test_positive_score_iff_ranked() {
        let engine = engine();
        let records = vec![
            record("A", "plain"),
            record("B", "beta access"),
            record("C", "plain").with_popularity(1),
            record("D", "plain"),
        ];
        let ranked = engine.score(&records);
        for r in &records {
            let positive = engine.score_one(r).score > 0.0;
            let present = ranked.iter().any(|s| s.record.name == r.name);
            assert_eq!(positive, present, "record {}", r.name);
        }
    }

    #[test]
    fn test_descending_with_stable_ties() {
        let engine = engine();
        let records = vec![
            record("First tie", "crypto wallet"),
            record("Top", "free fintech").with_popularity(50),
            record("Second tie", "saas dashboard"),
            record("Third tie", "productivity app"),
        ];
        let ranked = engine.score(&records);
        let names: Vec<_> = ranked.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["Top", "First tie", "Second tie", "Third tie"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let engine = engine();
        let records: Vec<_> = (0..200)
            .map(|i| record(&format!("P{i}"), if i % 3 == 0 { "launch promo" } else { "web3" })
                .with_popularity(i % 17))
            .collect();
        assert_eq!(engine.score(&records), engine.score(&records));
    }

    #[test]
    fn test_empty_vocabulary_disables_signal() {
        let config = ScoringConfig {
            bonus_keywords: Vec::new(),
            ..ScoringConfig::default()
        };
        let engine = ScoringEngine::new(&config);
        let scored = engine.score_one(&record("Orbit", "free credits"));
        assert!(!scored.has_bonus_signal);
        assert_eq!(scored.score, 0.0);
    }

    #[test]
    fn test_matching_ignores_case_beyond_ascii() {
        let config = ScoringConfig {
            category_keywords: vec!["ÉPARGNE".to_string()],
            ..ScoringConfig::default()
        };
        let engine = ScoringEngine::new(&config);
        assert!(engine.score_one(&record("Livret", "Compte Épargne")).has_category_signal);
    }
}
