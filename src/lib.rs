//! Recall - Long-Form Conversational Memory
//!
//! Gives a conversational agent durable, low-latency recall of salient
//! facts across thousands of turns without replaying full history:
//! heuristic extraction of candidate memories from each turn, SQLite
//! persistence with provenance and usage statistics, and multi-factor
//! relevance scoring for retrieval.

pub mod embedding;
pub mod error;
pub mod extract;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{RecallError, Result};
pub use session::{MemorySession, PromptStyle, SessionConfig};
pub use storage::MemoryStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
