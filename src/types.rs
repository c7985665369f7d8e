//! Core types for Recall

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory (`mem_` + 16 hex chars)
pub type MemoryId = String;

/// A single remembered fact extracted from conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier, assigned at creation
    pub memory_id: MemoryId,
    /// Memory type (preference, fact, ...)
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Short label; not required to be unique across memories
    pub key: String,
    /// The remembered content
    pub value: String,
    /// Turn index at which this memory was extracted
    pub source_turn: i64,
    /// Extraction confidence (0.0 - 1.0)
    pub confidence: f32,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// Turn index of the last retrieval hit
    pub last_accessed_turn: Option<i64>,
    /// Number of retrieval hits
    #[serde(default)]
    pub access_count: i64,
    /// Semantic vector; held in volatile memory only, never persisted
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Free-form annotation (e.g. extraction rationale)
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    /// Soft-delete flag; deactivated memories are excluded from normal reads
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Memory {
    /// Durable-field equality (embedding excluded; it is volatile)
    pub fn same_record(&self, other: &Memory) -> bool {
        self.memory_id == other.memory_id
            && self.memory_type == other.memory_type
            && self.key == other.key
            && self.value == other.value
            && self.source_turn == other.source_turn
            && (self.confidence - other.confidence).abs() < f32::EPSILON
            && self.last_accessed_turn == other.last_accessed_turn
            && self.access_count == other.access_count
            && self.metadata == other.metadata
            && self.active == other.active
    }
}

/// Closed tag set for memory classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// User preferences (e.g. "prefers calls after 11 AM")
    Preference,
    /// Facts about the user (e.g. "lives in Bangalore")
    Fact,
    /// Important people/places (e.g. "mother's name is Sarah")
    Entity,
    /// Limitations (e.g. "cannot work weekends")
    Constraint,
    /// Plans and promises (e.g. "meeting Friday at 2 PM")
    Commitment,
    /// Standing rules (e.g. "always use formal tone")
    Instruction,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Entity => "entity",
            MemoryType::Constraint => "constraint",
            MemoryType::Commitment => "commitment",
            MemoryType::Instruction => "instruction",
        }
    }

    pub fn all() -> &'static [MemoryType] {
        &[
            MemoryType::Preference,
            MemoryType::Fact,
            MemoryType::Entity,
            MemoryType::Constraint,
            MemoryType::Commitment,
            MemoryType::Instruction,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preference" => Ok(MemoryType::Preference),
            "fact" => Ok(MemoryType::Fact),
            "entity" => Ok(MemoryType::Entity),
            "constraint" => Ok(MemoryType::Constraint),
            "commitment" => Ok(MemoryType::Commitment),
            "instruction" => Ok(MemoryType::Instruction),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// One user/assistant exchange
///
/// Created once per turn by the session orchestrator, appended to the
/// session history and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Strictly advancing turn index
    pub turn_index: i64,
    /// What the user said
    pub user_text: String,
    /// What the assistant replied, if recorded
    pub reply_text: Option<String>,
    /// When the turn was processed
    pub timestamp: DateTime<Utc>,
    /// Ids of memories extracted this turn
    pub extracted: Vec<MemoryId>,
    /// Ids of memories retrieved this turn
    pub retrieved: Vec<MemoryId>,
}

/// Statistics about the memory store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreStats {
    /// Total active memories
    pub total_memories: i64,
    /// Active count per type
    pub by_type: HashMap<String, i64>,
    /// Mean confidence over active records
    pub average_confidence: f32,
    /// Records with a live in-memory embedding
    pub vector_store_size: usize,
}

/// Session-level statistics composed with store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub current_turn: i64,
    pub total_memories: i64,
    pub memories_by_type: HashMap<String, i64>,
    pub average_confidence: f32,
    pub total_extractions: i64,
    pub total_retrievals: i64,
    pub avg_extraction_time_ms: f64,
    pub avg_retrieval_time_ms: f64,
    pub conversation_history_length: usize,
}

/// JSON export document: per-memory records with embeddings always nulled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    pub export_timestamp: DateTime<Utc>,
    pub total_turns: i64,
    pub memories: Vec<Memory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trip() {
        for mt in MemoryType::all() {
            let parsed: MemoryType = mt.as_str().parse().unwrap();
            assert_eq!(parsed, *mt);
        }
    }

    #[test]
    fn memory_type_serde_lowercase() {
        let json = serde_json::to_string(&MemoryType::Commitment).unwrap();
        assert_eq!(json, "\"commitment\"");
        let back: MemoryType = serde_json::from_str("\"preference\"").unwrap();
        assert_eq!(back, MemoryType::Preference);
    }

    #[test]
    fn unknown_type_rejected() {
        assert!("reminder".parse::<MemoryType>().is_err());
    }
}
