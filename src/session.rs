//! Session orchestration
//!
//! Sequences retrieval then extraction for every turn and keeps the
//! append-only conversation history plus latency metrics. The ordering is
//! a contract: retrieval runs against the turn counter before any of this
//! turn's extractions are saved, so a turn's own disclosures are never
//! visible to itself.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::extract::{ExtractionRules, LanguageModel, MemoryExtractor};
use crate::retrieval::{MemoryRetriever, DEFAULT_MAX_RESULTS};
use crate::storage::MemoryStore;
use crate::types::{ConversationTurn, Memory, MemoryExport, MemoryType, SessionStats};

/// Default confidence floor for retrieval
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// How retrieved memories are rendered for prompt injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Conversational bullet list
    Natural,
    /// Numbered entries with type, turn and confidence
    Structured,
}

/// Outcome of processing one conversation turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_index: i64,
    pub retrieved: Vec<Memory>,
    pub extracted: Vec<Memory>,
    pub retrieval_time_ms: f64,
    pub extraction_time_ms: f64,
}

#[derive(Debug, Default)]
struct SessionMetrics {
    extraction_times_ms: Vec<f64>,
    retrieval_times_ms: Vec<f64>,
    total_extracted: i64,
    total_retrievals: i64,
}

/// Builder-style configuration for a [`MemorySession`]
pub struct SessionConfig {
    pub db_path: String,
    pub rules: ExtractionRules,
    pub model: Option<Arc<dyn LanguageModel>>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub top_k: usize,
    pub auto_extract: bool,
    pub use_external_model: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: "memory_store.db".to_string(),
            rules: ExtractionRules::default(),
            model: None,
            embedder: None,
            top_k: DEFAULT_MAX_RESULTS,
            auto_extract: true,
            use_external_model: false,
        }
    }
}

/// Coordinates extraction, storage and retrieval across a conversation
pub struct MemorySession {
    store: Arc<MemoryStore>,
    extractor: MemoryExtractor,
    retriever: MemoryRetriever,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    auto_extract: bool,
    use_external_model: bool,
    turn_count: i64,
    history: Vec<ConversationTurn>,
    metrics: SessionMetrics,
}

impl MemorySession {
    pub fn open(config: SessionConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::open(&config.db_path)?);
        Self::with_store(store, config)
    }

    /// In-memory session for tests and demos
    pub fn open_in_memory(config: SessionConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::open_in_memory()?);
        Self::with_store(store, config)
    }

    fn with_store(store: Arc<MemoryStore>, config: SessionConfig) -> Result<Self> {
        let extractor = MemoryExtractor::new(config.rules, config.model)?;
        let retriever = MemoryRetriever::new(store.clone(), config.embedder.clone())
            .with_max_results(config.top_k);

        Ok(Self {
            store,
            extractor,
            retriever,
            embedder: config.embedder,
            auto_extract: config.auto_extract,
            use_external_model: config.use_external_model,
            turn_count: 0,
            history: Vec::new(),
            metrics: SessionMetrics::default(),
        })
    }

    /// Process one conversation turn
    ///
    /// Retrieval runs first, against the advanced counter, so memories
    /// extracted from this very turn cannot appear in its own results.
    pub fn process_turn(&mut self, user_text: &str, reply_text: Option<&str>) -> TurnOutcome {
        self.process_turn_with(user_text, reply_text, true)
    }

    /// Process one turn with an explicit extraction override
    pub fn process_turn_with(
        &mut self,
        user_text: &str,
        reply_text: Option<&str>,
        should_extract: bool,
    ) -> TurnOutcome {
        self.turn_count += 1;
        let turn_index = self.turn_count;

        let started = Instant::now();
        let retrieved = self.retriever.retrieve(
            user_text,
            turn_index,
            None,
            DEFAULT_MIN_CONFIDENCE,
        );
        let retrieval_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.retrieval_times_ms.push(retrieval_time_ms);
        self.metrics.total_retrievals += 1;

        let mut extracted = Vec::new();
        let mut extraction_time_ms = 0.0;

        if should_extract && self.auto_extract {
            let started = Instant::now();
            extracted = self.extractor.extract(
                user_text,
                reply_text.unwrap_or(""),
                turn_index,
                self.use_external_model,
            );
            self.attach_embeddings(&mut extracted);

            let saved = self.store.save_batch(&extracted);
            if saved < extracted.len() {
                warn!(
                    attempted = extracted.len(),
                    saved, "some extracted memories were not persisted"
                );
            }

            extraction_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            self.metrics.extraction_times_ms.push(extraction_time_ms);
            self.metrics.total_extracted += saved as i64;
        }

        self.history.push(ConversationTurn {
            turn_index,
            user_text: user_text.to_string(),
            reply_text: reply_text.map(String::from),
            timestamp: Utc::now(),
            extracted: extracted.iter().map(|m| m.memory_id.clone()).collect(),
            retrieved: retrieved.iter().map(|m| m.memory_id.clone()).collect(),
        });

        debug!(
            turn_index,
            retrieved = retrieved.len(),
            extracted = extracted.len(),
            "turn processed"
        );

        TurnOutcome {
            turn_index,
            retrieved,
            extracted,
            retrieval_time_ms,
            extraction_time_ms,
        }
    }

    /// Embed candidate values when a provider is configured
    fn attach_embeddings(&self, memories: &mut [Memory]) {
        let Some(embedder) = &self.embedder else {
            return;
        };

        for memory in memories.iter_mut() {
            match embedder.embed(&memory.value) {
                Ok(vector) => memory.embedding = Some(vector),
                Err(e) => {
                    warn!(memory_id = %memory.memory_id, error = %e, "embedding failed");
                }
            }
        }
    }

    /// Retrieve relevant memories without advancing the conversation
    pub fn retrieve_memories(
        &mut self,
        query: &str,
        type_filter: Option<&[MemoryType]>,
        min_confidence: f32,
    ) -> Vec<Memory> {
        self.metrics.total_retrievals += 1;
        self.retriever
            .retrieve(query, self.turn_count, type_filter, min_confidence)
    }

    /// Format memories for injection into an LLM prompt
    pub fn format_for_prompt(memories: &[Memory], style: PromptStyle) -> String {
        if memories.is_empty() {
            return String::new();
        }

        match style {
            PromptStyle::Natural => {
                let mut lines = vec!["Based on what I know about you:".to_string()];
                for memory in memories {
                    let line = match memory.memory_type {
                        MemoryType::Preference => format!("- You prefer {}", memory.value),
                        MemoryType::Fact => format!("- {}", memory.value),
                        MemoryType::Commitment => {
                            format!("- You have committed to: {}", memory.value)
                        }
                        MemoryType::Constraint => format!("- Constraint: {}", memory.value),
                        MemoryType::Instruction => {
                            format!("- Standing instruction: {}", memory.value)
                        }
                        MemoryType::Entity => format!("- {}: {}", memory.key, memory.value),
                    };
                    lines.push(line);
                }
                lines.join("\n")
            }
            PromptStyle::Structured => {
                let mut lines = vec!["Relevant context from conversation:".to_string()];
                for (i, memory) in memories.iter().enumerate() {
                    lines.push(format!(
                        "{}. [{}] {}: {} (turn {}, conf: {:.2})",
                        i + 1,
                        memory.memory_type,
                        memory.key,
                        memory.value,
                        memory.source_turn,
                        memory.confidence
                    ));
                }
                lines.join("\n")
            }
        }
    }

    /// Session statistics composed with store statistics
    pub fn stats(&self) -> SessionStats {
        let store_stats = self.store.stats();

        SessionStats {
            current_turn: self.turn_count,
            total_memories: store_stats.total_memories,
            memories_by_type: store_stats.by_type,
            average_confidence: store_stats.average_confidence,
            total_extractions: self.metrics.total_extracted,
            total_retrievals: self.metrics.total_retrievals,
            avg_extraction_time_ms: mean(&self.metrics.extraction_times_ms),
            avg_retrieval_time_ms: mean(&self.metrics.retrieval_times_ms),
            conversation_history_length: self.history.len(),
        }
    }

    /// Export all memories as JSON, embeddings always nulled out
    pub fn export<P: AsRef<Path>>(&self, path: P) -> bool {
        let mut memories = self.store.get_all(true);
        for memory in &mut memories {
            memory.embedding = None;
        }

        let document = MemoryExport {
            export_timestamp: Utc::now(),
            total_turns: self.turn_count,
            memories,
        };

        let result = serde_json::to_string_pretty(&document)
            .map_err(crate::error::RecallError::from)
            .and_then(|json| std::fs::write(path.as_ref(), json).map_err(Into::into));

        match result {
            Ok(()) => {
                info!(path = %path.as_ref().display(), "memories exported");
                true
            }
            Err(e) => {
                warn!(error = %e, "export failed");
                false
            }
        }
    }

    /// Clear in-memory session state; the database is untouched
    pub fn reset(&mut self) {
        self.turn_count = 0;
        self.history.clear();
        self.metrics = SessionMetrics::default();
    }

    /// Current turn counter
    pub fn current_turn(&self) -> i64 {
        self.turn_count
    }

    /// Append-only conversation history
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The underlying store
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Clean shutdown; safe to call multiple times
    pub fn close(&self) {
        self.store.close();
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MemorySession {
        MemorySession::open_in_memory(SessionConfig::default()).unwrap()
    }

    #[test]
    fn turn_counter_advances() {
        let mut s = session();
        let outcome = s.process_turn("my name is rajesh and i live in bangalore", None);
        assert_eq!(outcome.turn_index, 1);
        assert_eq!(s.current_turn(), 1);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn retrieval_never_sees_same_turn_extractions() {
        let mut s = session();
        let outcome = s.process_turn("i prefer to communicate in kannada always", None);
        assert!(!outcome.extracted.is_empty());
        // The turn's own extractions were saved after retrieval ran
        assert!(outcome.retrieved.is_empty());

        let next = s.process_turn("what language do i prefer for communication today", None);
        assert!(!next.retrieved.is_empty());
    }

    #[test]
    fn history_records_memory_ids() {
        let mut s = session();
        let outcome = s.process_turn("my name is rajesh and i work at tcs", None);
        let turn = &s.history()[0];
        assert_eq!(turn.turn_index, 1);
        assert_eq!(turn.extracted.len(), outcome.extracted.len());
        assert!(turn.retrieved.is_empty());
    }

    #[test]
    fn should_extract_false_skips_extraction() {
        let mut s = session();
        let outcome = s.process_turn_with("my name is rajesh and i work at tcs", None, false);
        assert!(outcome.extracted.is_empty());
        assert_eq!(s.stats().total_extractions, 0);
    }

    #[test]
    fn stats_compose_store_and_session() {
        let mut s = session();
        s.process_turn("my name is rajesh and i work at tcs", None);
        s.process_turn("how are you", None);

        let stats = s.stats();
        assert_eq!(stats.current_turn, 2);
        assert_eq!(stats.conversation_history_length, 2);
        assert_eq!(stats.total_retrievals, 2);
        assert!(stats.total_memories > 0);
        assert!(stats.avg_retrieval_time_ms >= 0.0);
    }

    #[test]
    fn reset_clears_session_not_database() {
        let mut s = session();
        s.process_turn("my name is rajesh and i work at tcs", None);
        let before = s.stats().total_memories;

        s.reset();
        assert_eq!(s.current_turn(), 0);
        assert!(s.history().is_empty());
        assert_eq!(s.stats().total_memories, before);
    }

    #[test]
    fn prompt_formatting_styles() {
        let memory = Memory {
            memory_id: "mem_p".to_string(),
            memory_type: MemoryType::Preference,
            key: "preference_language".to_string(),
            value: "communicate in kannada".to_string(),
            source_turn: 1,
            confidence: 0.85,
            created_at: Utc::now(),
            last_accessed_turn: None,
            access_count: 0,
            embedding: None,
            metadata: None,
            active: true,
        };

        let natural = MemorySession::format_for_prompt(&[memory.clone()], PromptStyle::Natural);
        assert!(natural.contains("You prefer communicate in kannada"));

        let structured =
            MemorySession::format_for_prompt(&[memory], PromptStyle::Structured);
        assert!(structured.contains("[preference]"));
        assert!(structured.contains("turn 1"));

        assert!(MemorySession::format_for_prompt(&[], PromptStyle::Natural).is_empty());
    }

    #[test]
    fn export_nulls_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");

        let mut config = SessionConfig::default();
        config.embedder = Some(Arc::new(crate::embedding::HashingEmbedder::new(64)));
        let mut s = MemorySession::open_in_memory(config).unwrap();
        s.process_turn("my name is rajesh and i work at tcs", None);

        assert!(s.export(&path));

        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: MemoryExport = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc.total_turns, 1);
        assert!(!doc.memories.is_empty());
        assert!(doc.memories.iter().all(|m| m.embedding.is_none()));
    }
}
