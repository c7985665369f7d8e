//! Extraction rule tables
//!
//! Immutable configuration data handed to the extractor at construction,
//! so engine instances can carry different rule sets. The builtin tables
//! target first-person disclosures in casual English.

use crate::types::MemoryType;

/// How a family derives memory keys from its matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// `<prefix><first 20 chars of the match, spaces underscored>`
    FromMatch(&'static str),
    /// `<prefix><running ordinal within the turn>`
    Ordinal(&'static str),
}

/// One pattern family: regexes sharing a type and a fixed confidence
#[derive(Debug, Clone)]
pub struct PatternFamily {
    pub memory_type: MemoryType,
    /// Confidence assigned to every match of this family
    pub confidence: f32,
    /// Matches shorter than this (trimmed) are discarded
    pub min_match_len: usize,
    pub key_style: KeyStyle,
    /// Regex sources; compiled once by the extractor
    pub patterns: Vec<String>,
}

/// Rules driving the deterministic pattern strategy
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    /// Turns with fewer words are rejected outright
    pub min_words: usize,
    /// Lowercase phrases that mark a turn as small talk
    pub stoplist: Vec<String>,
    pub families: Vec<PatternFamily>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            min_words: 5,
            stoplist: [
                "how are you",
                "how's the weather",
                "what's the latest",
                "tell me a joke",
                "what day is it",
                "what can you help",
                "that's interesting",
                "thanks",
                "i see",
                "okay",
                "sure",
                "can you explain",
                "here to help",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            families: vec![
                PatternFamily {
                    memory_type: MemoryType::Preference,
                    confidence: 0.85,
                    min_match_len: 4,
                    key_style: KeyStyle::FromMatch("preference_"),
                    patterns: vec![
                        r"(?:my |i )prefer (?:to )?(.+?)(?:\.|$|,)".to_string(),
                        r"(?:always|never) (.+?)(?:\.|$|,)".to_string(),
                        r"(?:language is|speak|communicate in) ([a-z]+)".to_string(),
                    ],
                },
                PatternFamily {
                    memory_type: MemoryType::Fact,
                    confidence: 0.8,
                    min_match_len: 3,
                    key_style: KeyStyle::FromMatch("user_"),
                    patterns: vec![
                        r"(?:my name is|i am|i'm) ([a-z ]{3,})".to_string(),
                        r"(?:i live in|i'm from|from) ([a-z ]{3,})".to_string(),
                        r"(?:i work at|work for) ([a-z ]{3,})".to_string(),
                        r"allergic to ([a-z]+)".to_string(),
                        r"(?:i'm|i am) (?:a |an )?([a-z]+ (?:engineer|developer|designer|manager))"
                            .to_string(),
                    ],
                },
                PatternFamily {
                    memory_type: MemoryType::Commitment,
                    confidence: 0.75,
                    min_match_len: 3,
                    key_style: KeyStyle::Ordinal("commitment_"),
                    patterns: vec![
                        r"(?:meeting|call|appointment).+?(?:at|@) ([0-9]+\s*(?:am|pm))".to_string(),
                        r"(?:every|each) ([a-z]+day).+?([0-9]+\s*(?:am|pm))".to_string(),
                        r"birthday.+?on ([a-z]+ [0-9]+)".to_string(),
                    ],
                },
            ],
        }
    }
}

impl ExtractionRules {
    /// True when the lowercase text contains any stoplisted phrase
    pub fn is_small_talk(&self, text_lower: &str) -> bool {
        self.stoplist.iter().any(|p| text_lower.contains(p.as_str()))
    }
}
