//! Relevance scoring factors
//!
//! Each factor is normalized to [0,1]. The composite score is a weighted
//! sum; when a factor is inapplicable its weight is dropped and the
//! remaining weights are renormalized to sum to 1, never zero-padded.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Recency half-life: a memory from 100 turns ago keeps ~50% of its
/// recency score, one from 1000 turns ago a small but nonzero value.
pub const HALF_LIFE_TURNS: f64 = 100.0;

/// Frequency saturation point: ln(1+count)/ln(21) reaches 1.0 near 20 hits
const FREQUENCY_SATURATION: f64 = 20.0;

/// Baseline frequency score for never-accessed memories
const FREQUENCY_BASELINE: f32 = 0.1;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "is", "are", "was", "were",
    ]
    .into_iter()
    .collect()
});

/// Weights for the composite relevance score
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub keyword: f32,
    pub semantic: f32,
    pub recency: f32,
    pub frequency: f32,
    pub confidence: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 0.30,
            semantic: 0.30,
            recency: 0.15,
            frequency: 0.10,
            confidence: 0.15,
        }
    }
}

/// Weighted combination over the applicable factors
pub fn combine(factors: &[(f32, f32)]) -> f32 {
    let total_weight: f32 = factors.iter().map(|(_, w)| w).sum();
    if total_weight == 0.0 {
        return 0.0;
    }

    factors.iter().map(|(s, w)| s * w / total_weight).sum()
}

/// Stopword-filtered, punctuation-stripped token set
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Jaccard similarity between two token sets; 0 when either is empty
pub fn keyword_overlap(query_tokens: &HashSet<String>, memory_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() || memory_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens.intersection(memory_tokens).count();
    let union = query_tokens.union(memory_tokens).count();
    if union == 0 {
        return 0.0;
    }

    overlap as f32 / union as f32
}

/// Exponential decay with half-life [`HALF_LIFE_TURNS`], clamped to [0,1]
pub fn recency_score(source_turn: i64, current_turn: i64) -> f32 {
    let turns_ago = (current_turn - source_turn) as f64;
    let decay = std::f64::consts::LN_2 / HALF_LIFE_TURNS;
    ((-decay * turns_ago).exp() as f32).clamp(0.0, 1.0)
}

/// Usage-based boost, saturating logarithmically near 20 accesses
pub fn frequency_score(access_count: i64) -> f32 {
    if access_count <= 0 {
        return FREQUENCY_BASELINE;
    }

    let score = (1.0 + access_count as f64).ln() / (1.0 + FREQUENCY_SATURATION).ln();
    (score as f32).min(1.0)
}
