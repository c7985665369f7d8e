//! Relevance-ranked memory retrieval
//!
//! A pure function of the store's current content, plus one deliberate
//! side effect: every memory that makes the result set gets its access
//! stats bumped, which feeds the frequency factor of future scores.
//! Frequently surfaced memories therefore become more likely to surface
//! again; this feedback loop is part of the ranking design.

pub mod scoring;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::storage::MemoryStore;
use crate::types::{Memory, MemoryType};
use scoring::{combine, frequency_score, keyword_overlap, recency_score, tokenize, ScoreWeights};

/// Default result cap per query
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Scores and ranks stored memories against a query
pub struct MemoryRetriever {
    store: Arc<MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    weights: ScoreWeights,
    max_results: usize,
}

impl MemoryRetriever {
    pub fn new(store: Arc<MemoryStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            store,
            embedder,
            weights: ScoreWeights::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Find the most relevant memories for a query
    ///
    /// Hard filters first (type set, minimum confidence), then the
    /// composite score, then a stable sort so equal scores keep insertion
    /// order. At most `max_results` strictly-positive-scoring memories
    /// are returned, and each is marked accessed at `current_turn`.
    pub fn retrieve(
        &self,
        query: &str,
        current_turn: i64,
        type_filter: Option<&[MemoryType]>,
        min_confidence: f32,
    ) -> Vec<Memory> {
        let mut candidates = self.store.get_all(true);

        if let Some(types) = type_filter {
            candidates.retain(|m| types.contains(&m.memory_type));
        }
        candidates.retain(|m| m.confidence >= min_confidence);

        if candidates.is_empty() {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        // One provider call per query; failures just disable the factor
        let query_vector = self.embedder.as_ref().and_then(|e| match e.embed(query) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(error = %err, "query embedding failed, semantic factor disabled");
                None
            }
        });

        let mut scored: Vec<(Memory, f32)> = candidates
            .into_iter()
            .map(|memory| {
                let score = self.score(&memory, &query_tokens, query_vector.as_deref(), current_turn);
                (memory, score)
            })
            .collect();

        // Stable: ties keep store read order (insertion order)
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.max_results);

        let results: Vec<Memory> = scored
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(memory, _)| memory)
            .collect();

        for memory in &results {
            self.store.mark_accessed(&memory.memory_id, current_turn);
        }

        debug!(
            query_len = query.len(),
            current_turn,
            returned = results.len(),
            "retrieval complete"
        );

        results
    }

    /// Composite relevance of one memory for the query
    fn score(
        &self,
        memory: &Memory,
        query_tokens: &std::collections::HashSet<String>,
        query_vector: Option<&[f32]>,
        current_turn: i64,
    ) -> f32 {
        let mut factors: Vec<(f32, f32)> = Vec::with_capacity(5);

        let memory_tokens = tokenize(&format!("{} {}", memory.key, memory.value));
        factors.push((
            keyword_overlap(query_tokens, &memory_tokens),
            self.weights.keyword,
        ));

        // Applicable only with both a stored vector and a provider;
        // otherwise the weight is dropped and the rest renormalize
        if let (Some(memory_vector), Some(query_vector)) = (&memory.embedding, query_vector) {
            let cosine = cosine_similarity(query_vector, memory_vector);
            factors.push(((cosine + 1.0) / 2.0, self.weights.semantic));
        }

        factors.push((
            recency_score(memory.source_turn, current_turn),
            self.weights.recency,
        ));
        factors.push((frequency_score(memory.access_count), self.weights.frequency));
        factors.push((memory.confidence, self.weights.confidence));

        combine(&factors)
    }

    /// Memories of one type ranked by the average of recency and confidence
    pub fn get_by_type(
        &self,
        memory_type: MemoryType,
        current_turn: i64,
        limit: usize,
    ) -> Vec<Memory> {
        let mut scored: Vec<(Memory, f32)> = self
            .store
            .find_by_type(memory_type)
            .into_iter()
            .map(|memory| {
                let score =
                    (recency_score(memory.source_turn, current_turn) + memory.confidence) / 2.0;
                (memory, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        scored.into_iter().map(|(memory, _)| memory).collect()
    }

    /// Memories from the last `window` turns, newest first, no scoring
    pub fn get_recent(&self, current_turn: i64, window: i64) -> Vec<Memory> {
        let start_turn = (current_turn - window).max(0);

        let mut recent: Vec<Memory> = self
            .store
            .get_all(true)
            .into_iter()
            .filter(|m| m.source_turn >= start_turn)
            .collect();

        recent.sort_by(|a, b| b.source_turn.cmp(&a.source_turn));
        recent.truncate(self.max_results);
        recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use chrono::Utc;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = MemoryStore::open_in_memory().unwrap();
        for (id, mem_type, key, value, turn, confidence) in [
            (
                "mem_lang",
                MemoryType::Preference,
                "preference_communicate",
                "communicate in kannada",
                1,
                0.85,
            ),
            (
                "mem_name",
                MemoryType::Fact,
                "user_rajesh",
                "rajesh",
                1,
                0.8,
            ),
            (
                "mem_meet",
                MemoryType::Commitment,
                "commitment_0",
                "friday 3 pm",
                7,
                0.75,
            ),
            (
                "mem_weak",
                MemoryType::Fact,
                "user_misc",
                "unrelated detail",
                9,
                0.4,
            ),
        ] {
            store.save(&Memory {
                memory_id: id.to_string(),
                memory_type: mem_type,
                key: key.to_string(),
                value: value.to_string(),
                source_turn: turn,
                confidence,
                created_at: Utc::now(),
                last_accessed_turn: None,
                access_count: 0,
                embedding: None,
                metadata: None,
                active: true,
            });
        }
        Arc::new(store)
    }

    #[test]
    fn min_confidence_is_a_hard_filter() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None);
        let results = retriever.retrieve("unrelated detail", 10, None, 0.5);
        assert!(results.iter().all(|m| m.confidence >= 0.5));
    }

    #[test]
    fn type_filter_is_a_hard_filter() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None);
        let results = retriever.retrieve(
            "kannada language friday",
            10,
            Some(&[MemoryType::Preference]),
            0.0,
        );
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|m| m.memory_type == MemoryType::Preference));
    }

    #[test]
    fn result_length_capped() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None).with_max_results(2);
        let results = retriever.retrieve("kannada rajesh friday detail", 10, None, 0.0);
        assert!(results.len() <= 2);
    }

    #[test]
    fn retrieval_updates_access_stats() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store.clone(), None);
        let results = retriever.retrieve("what language do i speak", 42, None, 0.5);

        assert!(!results.is_empty());
        for memory in &results {
            let after = store.get(&memory.memory_id).unwrap();
            assert_eq!(after.access_count, memory.access_count + 1);
            assert_eq!(after.last_accessed_turn, Some(42));
        }
    }

    #[test]
    fn keyword_match_ranks_first() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None);
        let results = retriever.retrieve("what language do i speak kannada", 10, None, 0.5);
        assert_eq!(results[0].memory_id, "mem_lang");
    }

    #[test]
    fn semantic_factor_engages_with_embeddings() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(128));
        let store = MemoryStore::open_in_memory().unwrap();
        let mut memory = Memory {
            memory_id: "mem_sem".to_string(),
            memory_type: MemoryType::Fact,
            key: "user_city".to_string(),
            value: "lives in bangalore".to_string(),
            source_turn: 1,
            confidence: 0.8,
            created_at: Utc::now(),
            last_accessed_turn: None,
            access_count: 0,
            embedding: None,
            metadata: None,
            active: true,
        };
        memory.embedding = Some(embedder.embed(&memory.value).unwrap());
        store.save(&memory);

        let retriever = MemoryRetriever::new(Arc::new(store), Some(embedder));
        let results = retriever.retrieve("which city does the user live in", 5, None, 0.5);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let store = MemoryStore::open_in_memory().unwrap();
        // Identical scoring inputs: same turn, confidence and token overlap
        for id in ["mem_first", "mem_second", "mem_third"] {
            store.save(&Memory {
                memory_id: id.to_string(),
                memory_type: MemoryType::Fact,
                key: "user_city".to_string(),
                value: "bangalore".to_string(),
                source_turn: 1,
                confidence: 0.8,
                created_at: Utc::now(),
                last_accessed_turn: None,
                access_count: 0,
                embedding: None,
                metadata: None,
                active: true,
            });
        }

        let retriever = MemoryRetriever::new(Arc::new(store), None);
        let results = retriever.retrieve("bangalore", 2, None, 0.5);
        let ids: Vec<&str> = results.iter().map(|m| m.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["mem_first", "mem_second", "mem_third"]);
    }

    #[test]
    fn get_recent_is_newest_first() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None);
        let recent = retriever.get_recent(10, 10);
        let turns: Vec<i64> = recent.iter().map(|m| m.source_turn).collect();
        let mut sorted = turns.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(turns, sorted);
    }

    #[test]
    fn get_by_type_respects_limit() {
        let store = seeded_store();
        let retriever = MemoryRetriever::new(store, None);
        let facts = retriever.get_by_type(MemoryType::Fact, 10, 1);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].memory_type, MemoryType::Fact);
    }

    #[test]
    fn empty_store_returns_empty() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let retriever = MemoryRetriever::new(store, None);
        assert!(retriever.retrieve("anything at all", 1, None, 0.5).is_empty());
    }
}
