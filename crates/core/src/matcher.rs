//! Cross-platform market matching by title similarity (spec §4.12).

use crate::types::{MarketPair, UnifiedMarket};
use std::collections::HashSet;

/// Words common enough in market titles to carry no discriminating signal.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "will", "be", "to", "of", "in", "on", "at", "by", "is", "are", "for", "and",
    "or", "this", "that", "with",
];

/// Similarity threshold at or above which a pair is considered a match.
pub const MIN_MATCH_SIMILARITY: f64 = 0.80;
/// Markets closing further apart than this are never paired even if titles
/// match exactly.
const MAX_SETTLEMENT_SKEW_HOURS: i64 = 24;

/// Lowercases, strips punctuation, removes stopwords, and tokenizes `title`
/// into a set of words.
fn tokenize(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets: `|intersection| / |union|`, `0.0`
/// when both are empty.
#[must_use]
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Configuration for the matcher, following the teacher's
/// builder-with-presets idiom.
#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub min_similarity: f64,
    pub max_settlement_skew_hours: i64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_similarity: MIN_MATCH_SIMILARITY,
            max_settlement_skew_hours: MAX_SETTLEMENT_SKEW_HOURS,
        }
    }
}

impl MatchConfig {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            min_similarity: 0.90,
            max_settlement_skew_hours: 6,
        }
    }

    #[must_use]
    pub fn lenient() -> Self {
        Self {
            min_similarity: 0.70,
            max_settlement_skew_hours: 48,
        }
    }
}

/// Maintains the normalized-title index across venues and produces
/// [`MarketPair`]s for new arrivals.
pub struct MarketMatcher {
    config: MatchConfig,
    known: Vec<(UnifiedMarket, HashSet<String>)>,
}

impl Default for MarketMatcher {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl MarketMatcher {
    #[must_use]
    pub fn new(config: MatchConfig) -> Self {
        Self {
            config,
            known: Vec::new(),
        }
    }

    /// Registers `market` and returns every [`MarketPair`] it forms with a
    /// previously known market on a different venue.
    pub fn register(&mut self, market: UnifiedMarket) -> Vec<MarketPair> {
        let tokens = tokenize(&market.title);
        let mut pairs = Vec::new();

        for (other, other_tokens) in &self.known {
            if other.exchange == market.exchange {
                continue;
            }
            let similarity = jaccard_similarity(&tokens, other_tokens);
            let skew_hours = (other.close_time - market.close_time).num_hours().abs();
            if similarity >= self.config.min_similarity && skew_hours <= self.config.max_settlement_skew_hours {
                pairs.push(MarketPair {
                    market_a: other.clone(),
                    market_b: market.clone(),
                    similarity,
                });
            }
        }

        self.known.push((market, tokens));
        pairs
    }
}
