//! Memory extraction
//!
//! Converts one turn's text into zero or more candidate memories. Two
//! mutually exclusive strategies: an external language model (when
//! configured and requested) and the deterministic pattern fallback.
//! Model failures degrade to the pattern path; malformed model output
//! yields an empty candidate set. Neither is ever surfaced as an error.

mod rules;

pub use rules::{ExtractionRules, KeyStyle, PatternFamily};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{RecallError, Result};
use crate::types::{Memory, MemoryType};

/// External language model collaborator
///
/// Given a filled prompt, returns text expected to contain a JSON array
/// matching the extraction schema. Any shape violation is tolerated.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

const EXTRACTION_PROMPT: &str = r#"You are a memory extraction system. Extract ONLY important information worth remembering.

Memory Types:
- preference: User preferences (e.g., "prefers calls after 11 AM")
- fact: Facts about the user (e.g., "lives in San Francisco")
- entity: Important people/places (e.g., "mother's name is Sarah")
- constraint: Limitations (e.g., "cannot work weekends")
- commitment: Plans/promises (e.g., "meeting Friday at 2 PM")
- instruction: Standing rules (e.g., "always use formal tone")

Conversation:
User: {user_message}
Assistant: {assistant_message}

Return JSON array of memories (or [] if nothing important):
[
  {
    "type": "preference",
    "key": "language_preference",
    "value": "Kannada",
    "confidence": 0.95,
    "rationale": "User explicitly stated"
  }
]

Be selective - casual chat doesn't need to be stored."#;

/// One item of the external model's JSON array
#[derive(Debug, Deserialize)]
struct ModelExtraction {
    #[serde(rename = "type")]
    memory_type: String,
    key: String,
    value: String,
    confidence: Option<f32>,
    rationale: Option<String>,
}

/// A pattern family with its regexes compiled
struct CompiledFamily {
    memory_type: MemoryType,
    confidence: f32,
    min_match_len: usize,
    key_style: KeyStyle,
    regexes: Vec<Regex>,
}

/// Extracts memorable information from conversation turns
pub struct MemoryExtractor {
    families: Vec<CompiledFamily>,
    rules: ExtractionRules,
    model: Option<Arc<dyn LanguageModel>>,
}

impl MemoryExtractor {
    /// Compile the rule set; fails only on an invalid pattern
    pub fn new(rules: ExtractionRules, model: Option<Arc<dyn LanguageModel>>) -> Result<Self> {
        let families = rules
            .families
            .iter()
            .map(|family| {
                let regexes = family
                    .patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p).map_err(|e| {
                            RecallError::InvalidInput(format!("bad pattern '{}': {}", p, e))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledFamily {
                    memory_type: family.memory_type,
                    confidence: family.confidence,
                    min_match_len: family.min_match_len,
                    key_style: family.key_style,
                    regexes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            families,
            rules,
            model,
        })
    }

    /// Extractor with the builtin rule tables and no model
    pub fn with_defaults() -> Result<Self> {
        Self::new(ExtractionRules::default(), None)
    }

    /// Extract candidate memories from one turn
    ///
    /// Persistence is the caller's responsibility; this has no side
    /// effects beyond returning candidates.
    pub fn extract(
        &self,
        user_text: &str,
        reply_text: &str,
        turn_index: i64,
        use_external_model: bool,
    ) -> Vec<Memory> {
        if use_external_model {
            if let Some(model) = &self.model {
                match self.extract_with_model(model.as_ref(), user_text, reply_text, turn_index) {
                    Ok(memories) => return memories,
                    Err(e) => {
                        warn!(error = %e, "model extraction failed, using patterns instead");
                    }
                }
            }
        }

        self.extract_with_patterns(user_text, turn_index)
    }

    fn extract_with_model(
        &self,
        model: &dyn LanguageModel,
        user_text: &str,
        reply_text: &str,
        turn_index: i64,
    ) -> Result<Vec<Memory>> {
        let prompt = EXTRACTION_PROMPT
            .replace("{user_message}", user_text)
            .replace("{assistant_message}", reply_text);

        let response = model.complete(&prompt)?;
        let items = parse_model_response(&response);

        let mut memories = Vec::with_capacity(items.len());
        for item in items {
            let memory_type: MemoryType = match item.memory_type.parse() {
                Ok(t) => t,
                Err(_) => {
                    debug!(item_type = %item.memory_type, "skipping extraction with unknown type");
                    continue;
                }
            };

            let mut metadata = HashMap::new();
            metadata.insert(
                "rationale".to_string(),
                serde_json::Value::String(item.rationale.unwrap_or_default()),
            );

            memories.push(Memory {
                memory_id: make_memory_id(&item.key, turn_index),
                memory_type,
                key: item.key,
                value: item.value,
                source_turn: turn_index,
                confidence: item.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
                created_at: Utc::now(),
                last_accessed_turn: None,
                access_count: 0,
                embedding: None,
                metadata: Some(metadata),
                active: true,
            });
        }

        Ok(memories)
    }

    /// Deterministic fallback: scan the lowercase user text against the
    /// pattern families. Every match independently yields one candidate;
    /// repeated disclosures across turns are stored again, not merged.
    fn extract_with_patterns(&self, user_text: &str, turn_index: i64) -> Vec<Memory> {
        let mut memories = Vec::new();

        if user_text.split_whitespace().count() < self.rules.min_words {
            return memories;
        }

        let text = user_text.to_lowercase();
        if self.rules.is_small_talk(&text) {
            return memories;
        }

        for family in &self.families {
            for regex in &family.regexes {
                for captures in regex.captures_iter(&text) {
                    // Multi-group patterns contribute all groups, joined
                    let matched = captures
                        .iter()
                        .skip(1)
                        .flatten()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let matched = matched.trim();

                    if matched.len() < family.min_match_len {
                        continue;
                    }

                    let key = match family.key_style {
                        KeyStyle::FromMatch(prefix) => {
                            let head: String = matched.chars().take(20).collect();
                            format!("{}{}", prefix, head.replace(' ', "_"))
                        }
                        KeyStyle::Ordinal(prefix) => format!("{}{}", prefix, memories.len()),
                    };

                    let seed = format!("{}_{}", family.memory_type.as_str(), matched);
                    memories.push(Memory {
                        memory_id: make_memory_id(&seed, turn_index),
                        memory_type: family.memory_type,
                        key,
                        value: matched.to_string(),
                        source_turn: turn_index,
                        confidence: family.confidence,
                        created_at: Utc::now(),
                        last_accessed_turn: None,
                        access_count: 0,
                        embedding: None,
                        metadata: None,
                        active: true,
                    });
                }
            }
        }

        memories
    }
}

/// Pull a JSON array out of the model response
///
/// Takes the widest `[ ... ]` window; anything unparseable means no
/// candidates, not an error.
fn parse_model_response(response: &str) -> Vec<ModelExtraction> {
    let start = match response.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match response.rfind(']') {
        Some(i) if i > start => i,
        _ => return Vec::new(),
    };

    serde_json::from_str(&response[start..=end]).unwrap_or_default()
}

/// Derive a practically unique id from the key, turn and creation instant
pub fn make_memory_id(seed: &str, turn_index: i64) -> String {
    let unique = format!("{}_{}_{}", seed, turn_index, Utc::now().to_rfc3339());
    let digest = Sha256::digest(unique.as_bytes());
    format!("mem_{}", &hex::encode(digest)[..16])
}
