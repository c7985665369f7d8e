//! Persistent memory store
//!
//! Owns the durable records and the volatile embedding side-table.
//! Embeddings live only in process memory: after a restart the scalar
//! fields persist but semantic scoring contributes nothing until vectors
//! are supplied again. Storage errors are caught here, logged, and
//! surfaced as boolean failure; callers treat `false`/`None` as "not
//! persisted", never as a crash.

use dashmap::DashMap;
use tracing::{debug, warn};

use super::connection::Storage;
use super::queries;
use crate::error::Result;
use crate::types::{Memory, MemoryId, MemoryType, StoreStats};

/// Durable keyed storage for memory records
pub struct MemoryStore {
    storage: Storage,
    /// memory_id -> vector; volatile, lost on process restart
    embeddings: DashMap<MemoryId, Vec<f32>>,
}

impl MemoryStore {
    /// Open or create a store backed by the database at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(db_path)?,
            embeddings: DashMap::new(),
        })
    }

    /// In-memory store for tests and demos
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            storage: Storage::open_in_memory()?,
            embeddings: DashMap::new(),
        })
    }

    /// Insert-or-replace a memory by id; always re-activates
    ///
    /// The embedding, if present, goes only to the volatile side-table.
    pub fn save(&self, memory: &Memory) -> bool {
        match self.storage.with_connection(|conn| queries::upsert_memory(conn, memory)) {
            Ok(()) => {
                if let Some(embedding) = &memory.embedding {
                    self.embeddings
                        .insert(memory.memory_id.clone(), embedding.clone());
                }
                true
            }
            Err(e) => {
                warn!(memory_id = %memory.memory_id, error = %e, "failed to save memory");
                false
            }
        }
    }

    /// Save each memory; returns the number persisted
    ///
    /// Partial failure is tolerated: one failing record does not block the
    /// others.
    pub fn save_batch(&self, memories: &[Memory]) -> usize {
        memories.iter().filter(|m| self.save(m)).count()
    }

    /// Get an active memory, embedding reattached from the side-table
    pub fn get(&self, memory_id: &str) -> Option<Memory> {
        match self.storage.with_connection(|conn| queries::get_memory(conn, memory_id)) {
            Ok(Some(mut memory)) => {
                memory.embedding = self.embeddings.get(memory_id).map(|e| e.value().clone());
                Some(memory)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(memory_id, error = %e, "failed to read memory");
                None
            }
        }
    }

    /// All memories in insertion order, optionally only active ones
    pub fn get_all(&self, active_only: bool) -> Vec<Memory> {
        self.read_many(self.storage.with_connection(|conn| queries::get_all(conn, active_only)))
    }

    /// Active memories of one type
    pub fn find_by_type(&self, memory_type: MemoryType) -> Vec<Memory> {
        self.read_many(
            self.storage
                .with_connection(|conn| queries::find_by_type(conn, memory_type)),
        )
    }

    /// Active memories whose key contains the substring
    pub fn search_by_key(&self, substring: &str) -> Vec<Memory> {
        self.read_many(
            self.storage
                .with_connection(|conn| queries::search_by_key(conn, substring)),
        )
    }

    fn read_many(&self, result: Result<Vec<Memory>>) -> Vec<Memory> {
        match result {
            Ok(mut memories) => {
                for memory in &mut memories {
                    memory.embedding = self.embeddings.get(&memory.memory_id).map(|e| e.value().clone());
                }
                memories
            }
            Err(e) => {
                warn!(error = %e, "failed bulk read");
                Vec::new()
            }
        }
    }

    /// Record a retrieval hit; each call increments again
    pub fn mark_accessed(&self, memory_id: &str, turn_index: i64) -> bool {
        match self
            .storage
            .with_connection(|conn| queries::mark_accessed(conn, memory_id, turn_index))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(memory_id, error = %e, "failed to update access tracking");
                false
            }
        }
    }

    /// Soft delete: excluded from normal reads, row remains durable
    pub fn deactivate(&self, memory_id: &str) -> bool {
        match self
            .storage
            .with_connection(|conn| queries::deactivate(conn, memory_id))
        {
            Ok(()) => {
                debug!(memory_id, "memory deactivated");
                true
            }
            Err(e) => {
                warn!(memory_id, error = %e, "failed to deactivate memory");
                false
            }
        }
    }

    /// Statistics over active records plus the live vector count
    pub fn stats(&self) -> StoreStats {
        match self.storage.with_connection(queries::get_stats) {
            Ok(mut stats) => {
                stats.vector_store_size = self.embeddings.len();
                stats
            }
            Err(e) => {
                warn!(error = %e, "failed to compute store stats");
                StoreStats::default()
            }
        }
    }

    /// Release the database connection; safe to call multiple times
    pub fn close(&self) {
        self.storage.close();
    }

    /// Direct inspection hook for tests: does the row exist at all?
    pub fn row_exists(&self, memory_id: &str) -> bool {
        self.storage
            .with_connection(|conn| queries::row_exists(conn, memory_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(id: &str, turn: i64) -> Memory {
        Memory {
            memory_id: id.to_string(),
            memory_type: MemoryType::Preference,
            key: "language_preference".to_string(),
            value: "kannada".to_string(),
            source_turn: turn,
            confidence: 0.85,
            created_at: Utc::now(),
            last_accessed_turn: None,
            access_count: 0,
            embedding: None,
            metadata: None,
            active: true,
        }
    }

    #[test]
    fn save_and_get_round_trip() {
        let store = MemoryStore::open_in_memory().unwrap();
        let mem = sample("mem_0001", 1);
        assert!(store.save(&mem));

        let loaded = store.get("mem_0001").unwrap();
        assert!(loaded.same_record(&mem));
    }

    #[test]
    fn embedding_kept_in_side_table_only() {
        let store = MemoryStore::open_in_memory().unwrap();
        let mut mem = sample("mem_0002", 1);
        mem.embedding = Some(vec![0.5, 0.5]);
        assert!(store.save(&mem));

        let loaded = store.get("mem_0002").unwrap();
        assert_eq!(loaded.embedding, Some(vec![0.5, 0.5]));
        assert_eq!(store.stats().vector_store_size, 1);
    }

    #[test]
    fn save_batch_counts_successes() {
        let store = MemoryStore::open_in_memory().unwrap();
        let memories = vec![sample("mem_a", 1), sample("mem_b", 1)];
        assert_eq!(store.save_batch(&memories), 2);
    }

    #[test]
    fn search_by_key_matches_substrings() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&sample("mem_k1", 1));
        let mut other = sample("mem_k2", 2);
        other.key = "user_rajesh".to_string();
        store.save(&other);

        let hits = store.search_by_key("language");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_id, "mem_k1");
        assert!(store.search_by_key("nothing_like_this").is_empty());
    }

    #[test]
    fn find_by_type_filters_types() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&sample("mem_t1", 1));

        assert_eq!(store.find_by_type(MemoryType::Preference).len(), 1);
        assert!(store.find_by_type(MemoryType::Commitment).is_empty());
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.get("mem_missing").is_none());
    }

    #[test]
    fn deactivated_memory_hidden_but_durable() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&sample("mem_soft", 1));

        assert!(store.deactivate("mem_soft"));
        assert!(store.get("mem_soft").is_none());
        assert!(store.get_all(true).is_empty());
        assert!(store.row_exists("mem_soft"));
    }

    #[test]
    fn operations_after_close_report_failure() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.close();
        store.close();

        assert!(!store.save(&sample("mem_late", 1)));
        assert!(store.get_all(true).is_empty());
        assert_eq!(store.stats().total_memories, 0);
    }
}
