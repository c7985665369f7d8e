//! Database queries for memory records

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{Memory, MemoryType, StoreStats};

const MEMORY_COLUMNS: &str = "memory_id, type, key, value, source_turn, confidence, \
     created_at, last_accessed_turn, access_count, metadata, active";

/// Parse a memory from a database row
///
/// The embedding is volatile and reattached by the store, never read here.
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let memory_id: String = row.get("memory_id")?;
    let type_str: String = row.get("type")?;
    let key: String = row.get("key")?;
    let value: String = row.get("value")?;
    let source_turn: i64 = row.get("source_turn")?;
    let confidence: f64 = row.get("confidence")?;
    let created_at: String = row.get("created_at")?;
    let last_accessed_turn: Option<i64> = row.get("last_accessed_turn")?;
    let access_count: i64 = row.get("access_count")?;
    let metadata_str: Option<String> = row.get("metadata")?;
    let active: i64 = row.get("active")?;

    let memory_type = type_str.parse().unwrap_or(MemoryType::Fact);
    let metadata: Option<HashMap<String, serde_json::Value>> =
        metadata_str.and_then(|s| serde_json::from_str(&s).ok());

    Ok(Memory {
        memory_id,
        memory_type,
        key,
        value,
        source_turn,
        confidence: confidence as f32,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_accessed_turn,
        access_count,
        embedding: None,
        metadata,
        active: active != 0,
    })
}

/// Insert or replace a memory by id; always writes `active = 1`
pub fn upsert_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    let metadata_json = memory
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT OR REPLACE INTO memories
         (memory_id, type, key, value, source_turn, confidence,
          created_at, last_accessed_turn, access_count, metadata, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)",
        params![
            memory.memory_id,
            memory.memory_type.as_str(),
            memory.key,
            memory.value,
            memory.source_turn,
            memory.confidence as f64,
            memory.created_at.to_rfc3339(),
            memory.last_accessed_turn,
            memory.access_count,
            metadata_json,
        ],
    )?;

    Ok(())
}

/// Get an active memory by id
pub fn get_memory(conn: &Connection, memory_id: &str) -> Result<Option<Memory>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM memories WHERE memory_id = ? AND active = 1",
        MEMORY_COLUMNS
    ))?;

    match stmt.query_row(params![memory_id], memory_from_row) {
        Ok(memory) => Ok(Some(memory)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get all memories in insertion order, optionally only active ones
///
/// Single bulk query returning full rows; retrieval scans this every turn.
pub fn get_all(conn: &Connection, active_only: bool) -> Result<Vec<Memory>> {
    let sql = if active_only {
        format!(
            "SELECT {} FROM memories WHERE active = 1 ORDER BY rowid",
            MEMORY_COLUMNS
        )
    } else {
        format!("SELECT {} FROM memories ORDER BY rowid", MEMORY_COLUMNS)
    };

    let mut stmt = conn.prepare_cached(&sql)?;
    let memories = stmt
        .query_map([], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(memories)
}

/// All active memories of one type, insertion order
pub fn find_by_type(conn: &Connection, memory_type: MemoryType) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM memories WHERE type = ? AND active = 1 ORDER BY rowid",
        MEMORY_COLUMNS
    ))?;

    let memories = stmt
        .query_map(params![memory_type.as_str()], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(memories)
}

/// All active memories whose key contains the given substring
pub fn search_by_key(conn: &Connection, substring: &str) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM memories WHERE key LIKE ? AND active = 1 ORDER BY rowid",
        MEMORY_COLUMNS
    ))?;

    let pattern = format!("%{}%", substring);
    let memories = stmt
        .query_map(params![pattern], memory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(memories)
}

/// Record a retrieval hit: set last_accessed_turn, increment access_count
pub fn mark_accessed(conn: &Connection, memory_id: &str, turn_index: i64) -> Result<()> {
    conn.execute(
        "UPDATE memories
         SET last_accessed_turn = ?1, access_count = access_count + 1
         WHERE memory_id = ?2",
        params![turn_index, memory_id],
    )?;

    Ok(())
}

/// Soft delete: the row remains durable, excluded from normal reads
pub fn deactivate(conn: &Connection, memory_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE memories SET active = 0 WHERE memory_id = ?1",
        params![memory_id],
    )?;

    Ok(())
}

/// Whether a row exists at all, regardless of the active flag
pub fn row_exists(conn: &Connection, memory_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// Aggregate statistics over active records
pub fn get_stats(conn: &Connection) -> Result<StoreStats> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE active = 1",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare_cached(
        "SELECT type, COUNT(*) FROM memories WHERE active = 1 GROUP BY type",
    )?;
    let by_type: HashMap<String, i64> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let average_confidence: f64 = conn.query_row(
        "SELECT COALESCE(AVG(confidence), 0.0) FROM memories WHERE active = 1",
        [],
        |row| row.get(0),
    )?;

    Ok(StoreStats {
        total_memories: total,
        by_type,
        average_confidence: average_confidence as f32,
        // Filled in by the store, which owns the volatile side-table
        vector_store_size: 0,
    })
}
