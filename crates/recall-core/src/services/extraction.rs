//! Picking memory-worthy statements out of chat messages.

use recall_models::{Memory, SaveOptions};
use tracing::{debug, warn};

use super::memory::MemoryService;
use crate::Result;

/// Source tag for memories created from chat messages.
pub const EXTRACTION_SOURCE: &str = "extraction";

const DEFAULT_TRIGGERS: &[&str] = &[
    "remember",
    "my name is",
    "call me",
    "i am",
    "i'm",
    "i work",
    "i live",
    "i like",
    "i love",
    "i enjoy",
    "i prefer",
    "i hate",
    "i dislike",
    "i don't like",
    "my favorite",
    "my favourite",
    "i use",
    "i'm working on",
    "i am working on",
    "my project",
    "we use",
    "our team",
    "my wife",
    "my husband",
    "my partner",
    "my son",
    "my daughter",
    "i have",
    "i was born",
];

/// Prefixes stripped from a candidate before it is stored.
const STRIP_PREFIXES: &[&str] = &[
    "please remember that ",
    "please remember ",
    "remember that ",
    "remember ",
];

/// Which statements in a message are worth remembering.
#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    /// Lowercase phrases; a sentence must contain one.
    pub triggers: Vec<String>,
    /// Minimum candidate length in characters.
    pub min_length: usize,
    /// At most this many candidates per message.
    pub max_candidates: usize,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_TRIGGERS.iter().map(|t| t.to_string()).collect(),
            min_length: 10,
            max_candidates: 3,
        }
    }
}

impl ExtractionPolicy {
    fn matches(&self, sentence: &str) -> bool {
        let lower = sentence.to_lowercase();
        self.triggers
            .iter()
            .any(|t| contains_phrase(&lower, t))
    }
}

/// `phrase` occurs in `haystack` on word boundaries.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '\'';
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

fn strip_prefix(sentence: &str) -> &str {
    let lower = sentence.to_lowercase();
    for prefix in STRIP_PREFIXES {
        // Byte offsets only line up when lowercasing kept the length.
        if lower.len() == sentence.len() && lower.starts_with(prefix) {
            return sentence[prefix.len()..].trim_start();
        }
    }
    sentence
}

/// Statements from `message` that should become memories, in message order.
///
/// Questions are skipped. Duplicates within the message are dropped.
pub fn extract_memory_candidates(message: &str, policy: &ExtractionPolicy) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for raw in message.split_inclusive(['.', '!', '?', '\n']) {
        if candidates.len() >= policy.max_candidates {
            break;
        }

        let sentence = raw.trim();
        if sentence.ends_with('?') || !policy.matches(sentence) {
            continue;
        }

        let candidate = strip_prefix(sentence.trim_end_matches(['.', '!']).trim());
        if candidate.chars().count() < policy.min_length {
            continue;
        }
        if candidates.iter().any(|c| c.eq_ignore_ascii_case(candidate)) {
            continue;
        }
        candidates.push(candidate.to_string());
    }

    candidates
}

impl MemoryService {
    /// Extract candidates from a user message with the default policy and
    /// save each one.
    ///
    /// A candidate that fails to save is logged and skipped.
    pub async fn remember_from_message(&self, user_id: &str, message: &str) -> Result<Vec<Memory>> {
        self.remember_with_policy(user_id, message, &ExtractionPolicy::default())
            .await
    }

    pub async fn remember_with_policy(
        &self,
        user_id: &str,
        message: &str,
        policy: &ExtractionPolicy,
    ) -> Result<Vec<Memory>> {
        let candidates = extract_memory_candidates(message, policy);
        debug!(user_id, candidates = candidates.len(), "Extracted memory candidates");

        let mut saved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self
                .save_memory(user_id, &candidate, SaveOptions::from_source(EXTRACTION_SOURCE))
                .await
            {
                Ok(memory) => saved.push(memory),
                Err(e) if e.is_validation() => return Err(e),
                Err(e) => warn!(user_id, error = %e, "Failed to save extracted memory"),
            }
        }

        Ok(saved)
    }
}
