//! Memory model for storing long-term facts about a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{new_id, now};

/// Relevance score a memory is pushed down to when it is archived.
pub const ARCHIVED_RELEVANCE: f64 = 0.1;

/// Category of a remembered fact.
///
/// Used for retrieval weighting and to pick the summarization prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Facts about the user themselves (name, job, family)
    Personal,
    /// Likes, dislikes and habits
    Preference,
    /// Tools, languages, frameworks, infrastructure
    Technical,
    /// Ongoing work, deadlines, milestones
    Project,
    /// Anything else
    #[default]
    General,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Personal => "personal",
            MemoryType::Preference => "preference",
            MemoryType::Technical => "technical",
            MemoryType::Project => "project",
            MemoryType::General => "general",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "personal" => Some(MemoryType::Personal),
            "preference" => Some(MemoryType::Preference),
            "technical" => Some(MemoryType::Technical),
            "project" => Some(MemoryType::Project),
            "general" => Some(MemoryType::General),
            _ => None,
        }
    }

    pub fn all() -> &'static [MemoryType] {
        &[
            MemoryType::Personal,
            MemoryType::Preference,
            MemoryType::Technical,
            MemoryType::Project,
            MemoryType::General,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single remembered fact owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// Vector representation of `content`; `None` until an embedding provider succeeds.
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub relevance_score: f64,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    pub memory_type: MemoryType,
    pub importance_score: f64,
    pub cluster_id: Option<String>,
    /// Where the memory came from: 'chat', 'manual', 'extraction', ...
    pub source: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Create a fresh memory with default scores.
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            content: content.into(),
            embedding: None,
            relevance_score: 1.0,
            access_count: 0,
            last_accessed: None,
            semantic_tags: Vec::new(),
            memory_type: MemoryType::General,
            importance_score: 0.5,
            cluster_id: None,
            source: None,
            content_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the memory takes part in similarity search.
    pub fn is_embedded(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Whether maintenance has pushed the memory down to the archive floor.
    pub fn is_archived(&self) -> bool {
        self.relevance_score <= ARCHIVED_RELEVANCE + f64::EPSILON
    }

    /// Most recent moment the memory was useful: last access, else creation.
    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_accessed.unwrap_or(self.created_at)
    }

    /// Days since the memory was last surfaced (or created), including the
    /// fractional part.
    pub fn days_since_last_access(&self, at: DateTime<Utc>) -> f64 {
        at.signed_duration_since(self.last_used_at()).num_seconds() as f64 / 86_400.0
    }
}

/// A memory returned from retrieval together with its query similarity.
///
/// `similarity` is computed per query and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub similarity: f32,
}

impl ScoredMemory {
    pub fn new(memory: Memory, similarity: f32) -> Self {
        Self { memory, similarity }
    }
}

/// Lightweight near-duplicate match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMemory {
    pub id: String,
    pub content: String,
    pub similarity: f32,
}

/// How strictly incoming content is validated before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Reject empty or whitespace-only content.
    #[default]
    Basic,
    /// Additionally enforce minimum and maximum content length.
    Strict,
}

/// Caller options for saving a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SaveOptions {
    /// Origin tag stored with the memory.
    pub source: Option<String>,
    /// Skip classification and use this type.
    pub memory_type: Option<MemoryType>,
    /// Summarize long content before storing it.
    #[serde(default = "default_true")]
    pub summarize: bool,
    /// Similarity at or above which the content is merged into an existing memory.
    pub duplicate_threshold: Option<f32>,
    #[serde(default)]
    pub validation: ValidationLevel,
}

fn default_true() -> bool {
    true
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            source: None,
            memory_type: None,
            summarize: true,
            duplicate_threshold: None,
            validation: ValidationLevel::Basic,
        }
    }
}

impl SaveOptions {
    /// Options tagged with a source.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_summarize(mut self, summarize: bool) -> Self {
        self.summarize = summarize;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    pub fn strict(mut self) -> Self {
        self.validation = ValidationLevel::Strict;
        self
    }
}

/// Explicit user edit of a stored memory. `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    /// Replacement content; tags, importance and the embedding are re-derived.
    pub content: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub importance_score: Option<f64>,
}
