//! Heuristic memory classification.
//!
//! Pure functions deriving a memory's type, tags and importance from its
//! text. Categories are checked in a fixed order (personal, preference,
//! project, technical) and the first match wins.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use recall_models::MemoryType;
use regex::Regex;

/// Maximum number of tags attached to a memory.
pub const MAX_TAGS: usize = 8;

/// Keyword tags kept before topic tags are appended.
const MAX_KEYWORD_TAGS: usize = 6;

/// Category patterns in precedence order.
static TYPE_PATTERNS: Lazy<Vec<(MemoryType, Regex)>> = Lazy::new(|| {
    let table: [(MemoryType, &str); 4] = [
        (
            MemoryType::Personal,
            r"(?i)\b(my name is|call me|i am \d+|i'?m \d+|i work (as|at|for|in)|i live in|i was born|i'?m from|i grew up|my (wife|husband|partner|son|daughter|kids?|children|mother|father|mom|dad|brother|sister|family|birthday|age|job|pet|dog|cat))\b",
        ),
        (
            MemoryType::Preference,
            r"(?i)\b(i (really |usually |always |never )?(like|love|enjoy|prefer|hate|dislike|want|avoid)|my favou?rite|i'?d rather|i'?m (a fan|into)|not a fan)\b",
        ),
        (
            MemoryType::Project,
            r"(?i)\b(project|deadline|milestone|sprint|roadmap|launch|release|deliverables?|due (date|on|by)|working on|building|mvp|client)\b",
        ),
        (
            MemoryType::Technical,
            r"(?i)\b(typescript|javascript|python|rust|golang|java|kotlin|swift|react|vue|svelte|next\.?js|node(\.?js)?|sql|postgres(ql)?|supabase|docker|kubernetes|api|database|framework|library|code|coding|programming|git|aws|linux|css|html|server|backend|frontend)\b",
        ),
    ];

    table
        .into_iter()
        .filter_map(|(memory_type, pattern)| Regex::new(pattern).ok().map(|re| (memory_type, re)))
        .collect()
});

/// Topic tags added when any of their keywords occur.
const TOPICS: &[(&str, &[&str])] = &[
    (
        "programming",
        &[
            "typescript", "javascript", "python", "rust", "code", "coding", "programming",
            "react", "frontend", "backend", "api", "database", "developer",
        ],
    ),
    (
        "work",
        &["job", "work", "career", "office", "company", "colleague", "boss", "nurse", "engineer"],
    ),
    (
        "family",
        &["wife", "husband", "partner", "son", "daughter", "kids", "children", "mother", "father", "mom", "dad", "brother", "sister", "family"],
    ),
    (
        "hobby",
        &["hiking", "reading", "music", "guitar", "painting", "gaming", "travel", "cooking", "running", "photography"],
    ),
    ("food", &["food", "coffee", "tea", "vegan", "vegetarian", "pizza", "restaurant"]),
    ("health", &["health", "allergy", "allergic", "doctor", "exercise", "diet", "sleep"]),
    ("location", &["live", "city", "country", "moved", "born"]),
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had", "her",
    "was", "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now",
    "old", "see", "two", "who", "did", "does", "get", "got", "let", "say", "she", "too", "use",
    "that", "this", "with", "from", "they", "them", "then", "than", "there", "their", "what",
    "when", "where", "which", "while", "will", "would", "could", "should", "about", "into",
    "also", "just", "very", "much", "many", "some", "such", "only", "other", "been", "being",
    "were", "here", "more", "most", "like", "love", "prefer", "really", "want", "name", "know",
    "think", "because", "over", "after", "before", "each", "same", "well", "make", "made",
    "i'm", "im", "i've", "ive", "don't", "dont", "it's", "mine", "myself", "yours", "these",
    "those", "always", "never", "usually", "information", "additional",
];

/// Pick the memory type for `content`. Falls back to `General`.
pub fn determine_memory_type(content: &str) -> MemoryType {
    TYPE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(content))
        .map(|(memory_type, _)| *memory_type)
        .unwrap_or(MemoryType::General)
}

/// Extract keyword and topic tags.
///
/// Keywords are ordered by frequency, ties broken by first occurrence; topic
/// tags follow. Output is deduplicated and capped at [`MAX_TAGS`].
pub fn extract_semantic_tags(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .collect();

    // token -> (count, first index)
    let mut seen: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, token) in tokens.iter().enumerate() {
        if token.chars().count() < 3
            || token.chars().all(|c| c.is_ascii_digit())
            || STOPWORDS.contains(token)
        {
            continue;
        }
        seen.entry(*token).or_insert((0, idx)).0 += 1;
    }

    let mut keywords: Vec<(&str, usize, usize)> =
        seen.into_iter().map(|(t, (count, first))| (t, count, first)).collect();
    keywords.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let mut tags: Vec<String> = keywords
        .into_iter()
        .take(MAX_KEYWORD_TAGS)
        .map(|(t, _, _)| t.to_string())
        .collect();

    for (topic, keywords) in TOPICS {
        if tokens.iter().any(|t| keywords.contains(t)) && !tags.iter().any(|t| t.as_str() == *topic) {
            tags.push((*topic).to_string());
        }
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// Score how important a memory is, in `[0, 1]`.
///
/// Starts from a per-type base and adds bonuses for length, numbers and
/// proper names. Appending detail to content never lowers the score.
pub fn calculate_importance_score(content: &str, memory_type: MemoryType) -> f64 {
    let base: f64 = match memory_type {
        MemoryType::Personal => 0.8,
        MemoryType::Preference => 0.7,
        MemoryType::Project => 0.65,
        MemoryType::Technical => 0.6,
        MemoryType::General => 0.4,
    };

    let length = content.trim().chars().count();
    let mut score = base;
    if length >= 50 {
        score += 0.05;
    }
    if length >= 120 {
        score += 0.05;
    }
    if content.chars().any(|c| c.is_ascii_digit()) {
        score += 0.1;
    }
    if mentions_name(content) {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// True when a capitalized word appears somewhere other than a sentence start.
fn mentions_name(content: &str) -> bool {
    let mut sentence_start = true;

    for word in content.split_whitespace() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = cleaned
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase());

        if capitalized && !sentence_start && cleaned != "I" && !cleaned.starts_with("I'") {
            return true;
        }

        sentence_start = word.ends_with(|c: char| matches!(c, '.' | '!' | '?'));
    }

    false
}
