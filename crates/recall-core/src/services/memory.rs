//! Memory service: writing, retrieving and managing one user's memories.
//!
//! The service is the single entry point for callers. It owns the store
//! handle, the embedding provider and the summarizer; the maintenance,
//! deduplication, clustering and extraction operations live in sibling
//! modules as further `impl MemoryService` blocks.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use recall_embeddings::TextEmbedder;
use recall_models::{
    Memory, MemoryStats, MemoryType, MemoryUpdate, SaveOptions, ScoredMemory, ValidationLevel,
};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::classifier::{
    calculate_importance_score, determine_memory_type, extract_semantic_tags, MAX_TAGS,
};
use super::summarizer::Summarizer;
use crate::config::MemoryConfig;
use crate::db::vector::cosine_similarity;
use crate::db::{self, DbPool, MemoryFilter, UpdateMemory};
use crate::{Error, Result};

/// Separator used when new content is folded into an existing memory.
pub const MERGE_SEPARATOR: &str = "\n\nAdditional information: ";

/// Strict validation bounds, in characters.
pub const MIN_CONTENT_CHARS: usize = 3;
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Tags kept on a merged memory.
const MAX_MERGED_TAGS: usize = MAX_TAGS + 4;

/// Lowest threshold the adaptive plan will use.
const MIN_ADAPTIVE_THRESHOLD: f32 = 0.1;

/// Stores with fewer memories than this get a looser threshold.
const SPARSE_STORE_SIZE: i64 = 10;

static PERSONAL_QUERY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(my|me|myself|who am i|about me)\b").ok());

/// SHA-256 hex digest of the stored content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Retrieval limit and threshold chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalPlan {
    pub limit: usize,
    pub similarity_threshold: f32,
}

impl RetrievalPlan {
    /// Adapt the configured defaults to the query and the size of the store.
    ///
    /// Technical questions cast a wider net (lower threshold, more results);
    /// personal and project questions get a slightly lower threshold, as do
    /// users with few memories. Long contexts get a couple of extra results.
    pub fn for_context(context: &str, memory_count: i64, defaults: &MemoryConfig) -> Self {
        let mut threshold = defaults.similarity_threshold;
        let mut limit = defaults.retrieval_limit;

        let personal_query = PERSONAL_QUERY
            .as_ref()
            .is_some_and(|re| re.is_match(context));

        match determine_memory_type(context) {
            MemoryType::Technical => {
                threshold -= 0.1;
                limit += 3;
            }
            MemoryType::Personal | MemoryType::Project => threshold -= 0.05,
            _ if personal_query => threshold -= 0.05,
            _ => {}
        }

        if memory_count < SPARSE_STORE_SIZE {
            threshold -= 0.1;
        }

        if context.chars().count() > 200 {
            limit += 2;
        }

        Self {
            limit,
            similarity_threshold: threshold.max(MIN_ADAPTIVE_THRESHOLD),
        }
    }
}

/// Rank retrieval results.
///
/// Similarity decides, compared in 0.01-wide buckets; within a bucket the
/// higher relevance wins, then the higher importance, then the exact
/// similarity.
pub fn rank_memories(results: &mut [ScoredMemory]) {
    fn bucket(similarity: f32) -> i64 {
        (f64::from(similarity) * 100.0).floor() as i64
    }

    results.sort_by(|a, b| {
        bucket(b.similarity)
            .cmp(&bucket(a.similarity))
            .then_with(|| b.memory.relevance_score.total_cmp(&a.memory.relevance_score))
            .then_with(|| b.memory.importance_score.total_cmp(&a.memory.importance_score))
            .then_with(|| b.similarity.total_cmp(&a.similarity))
    });
}

/// Service for memory operations.
#[derive(Clone)]
pub struct MemoryService {
    pub(crate) db: DbPool,
    pub(crate) embedder: Arc<dyn TextEmbedder>,
    pub(crate) summarizer: Summarizer,
    pub(crate) config: MemoryConfig,
}

impl MemoryService {
    /// Create a new memory service.
    pub fn new(
        db: DbPool,
        embedder: Arc<dyn TextEmbedder>,
        summarizer: Summarizer,
        config: MemoryConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            summarizer,
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }

    /// Embed `text`, logging and counting failures instead of returning them.
    pub(crate) async fn embed_best_effort(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed_text(text).await {
            Ok(embedding) if !embedding.is_empty() => Some(embedding),
            Ok(_) => {
                warn!("Embedding provider returned an empty vector");
                metrics::counter!("recall_provider_failures_total", "provider" => "embedding")
                    .increment(1);
                None
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed");
                metrics::counter!("recall_provider_failures_total", "provider" => "embedding")
                    .increment(1);
                None
            }
        }
    }

    /// Load a memory and check that `user_id` owns it.
    pub(crate) async fn owned_memory(&self, user_id: &str, memory_id: &str) -> Result<Memory> {
        let memory = db::get_memory(&self.db, memory_id).await?;
        if memory.user_id != user_id {
            warn!(memory_id, user_id, "Rejected access to memory owned by another user");
            return Err(Error::Ownership {
                memory_id: memory_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(memory)
    }

    // =========================================================================
    // Writer
    // =========================================================================

    /// Store a fact for `user_id`, or merge it into a near-duplicate.
    ///
    /// Returns the inserted row or the updated survivor of a merge. Embedding
    /// failures do not fail the write; the row is stored without a vector and
    /// picked up later by backfill.
    pub async fn save_memory(
        &self,
        user_id: &str,
        content: &str,
        options: SaveOptions,
    ) -> Result<Memory> {
        validate_input(user_id, content, options.validation)?;
        let content = content.trim();

        let memory_type = options
            .memory_type
            .unwrap_or_else(|| determine_memory_type(content));
        let tags = extract_semantic_tags(content);
        let importance = calculate_importance_score(content, memory_type);

        let stored_content = if options.summarize
            && self.config.summarization_enabled
            && self.summarizer.should_summarize(content)
        {
            self.summarizer
                .summarize_memory_with_type(content, memory_type)
                .await
        } else {
            content.to_string()
        };

        let embedding = self.embed_best_effort(&stored_content).await;
        let hash = content_hash(&stored_content);
        let threshold = options
            .duplicate_threshold
            .unwrap_or(self.config.duplicate_threshold);

        let mut existing = None;
        if let Some(query) = &embedding {
            existing = db::search_similar(&self.db, user_id, query, threshold, 1)
                .await?
                .into_iter()
                .next();
        }
        if existing.is_none() {
            // Exact repeats are duplicates even without a vector.
            existing = db::find_memory_by_hash(&self.db, user_id, &hash)
                .await?
                .map(|m| (m, 1.0));
        }

        if let Some((existing, similarity)) = existing {
            debug!(
                memory_id = %existing.id,
                similarity,
                "Merging into existing memory"
            );
            return self
                .merge_into(existing, &stored_content, tags, importance, embedding)
                .await;
        }

        let now = Utc::now();
        let memory = Memory {
            id: recall_models::new_id(),
            user_id: user_id.to_string(),
            content: stored_content,
            embedding,
            relevance_score: 1.0,
            access_count: 0,
            last_accessed: None,
            semantic_tags: tags,
            memory_type,
            importance_score: importance,
            cluster_id: None,
            source: options.source,
            content_hash: Some(hash),
            created_at: now,
            updated_at: now,
        };

        let stored = db::insert_memory(&self.db, &memory).await?;
        metrics::counter!("recall_memories_saved_total").increment(1);

        info!(
            memory_id = %stored.id,
            user_id,
            memory_type = %stored.memory_type,
            embedded = stored.is_embedded(),
            "Saved memory"
        );

        Ok(stored)
    }

    /// Fold `new_content` into `existing` and refresh its scores.
    async fn merge_into(
        &self,
        existing: Memory,
        new_content: &str,
        tags: Vec<String>,
        importance: f64,
        new_embedding: Option<Vec<f32>>,
    ) -> Result<Memory> {
        let merged_content = if existing.content.contains(new_content) {
            existing.content.clone()
        } else {
            format!("{}{}{}", existing.content, MERGE_SEPARATOR, new_content)
        };
        let content_changed = merged_content != existing.content;

        let embedding = if content_changed {
            // Keep the old vector if the merged text cannot be embedded.
            self.embed_best_effort(&merged_content).await.map(Some)
        } else if !existing.is_embedded() {
            new_embedding.map(Some)
        } else {
            None
        };

        let mut merged_tags = existing.semantic_tags.clone();
        for tag in tags {
            if !merged_tags.contains(&tag) {
                merged_tags.push(tag);
            }
        }
        merged_tags.truncate(MAX_MERGED_TAGS);

        let update = UpdateMemory {
            content_hash: content_changed.then(|| content_hash(&merged_content)),
            content: content_changed.then_some(merged_content),
            embedding,
            semantic_tags: Some(merged_tags),
            importance_score: Some(existing.importance_score.max(importance)),
            relevance_score: Some(1.0),
            ..Default::default()
        };

        let merged = db::update_memory(&self.db, &existing.id, update).await?;
        metrics::counter!("recall_memories_merged_total").increment(1);

        info!(
            memory_id = %merged.id,
            user_id = %merged.user_id,
            content_changed,
            "Merged memory into existing record"
        );

        Ok(merged)
    }

    // =========================================================================
    // Retriever
    // =========================================================================

    /// Memories most relevant to `context`, best first.
    ///
    /// Never fails: embedding or store errors are logged and yield an empty
    /// list. Access bookkeeping for the returned memories runs in the
    /// background and does not affect the result.
    pub async fn get_relevant_memories(
        &self,
        user_id: &str,
        context: &str,
        limit: usize,
        similarity_threshold: f32,
    ) -> Vec<ScoredMemory> {
        if user_id.trim().is_empty() || context.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        metrics::counter!("recall_retrievals_total").increment(1);

        let Some(query) = self.embed_best_effort(context).await else {
            return Vec::new();
        };

        let candidates = match db::list_embedded_memories(&self.db, user_id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(user_id, error = %e, "Memory retrieval failed");
                return Vec::new();
            }
        };

        let mut results: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let similarity = memory
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(&query, e))?;
                (similarity >= similarity_threshold).then(|| ScoredMemory::new(memory, similarity))
            })
            .collect();

        rank_memories(&mut results);
        results.truncate(limit);

        debug!(
            user_id,
            returned = results.len(),
            limit,
            similarity_threshold,
            "Retrieved memories"
        );

        if !results.is_empty() {
            self.track_access(results.iter().map(|r| r.memory.id.clone()).collect());
        }

        results
    }

    /// Retrieval with the configured defaults.
    pub async fn get_relevant_memories_default(
        &self,
        user_id: &str,
        context: &str,
    ) -> Vec<ScoredMemory> {
        self.get_relevant_memories(
            user_id,
            context,
            self.config.retrieval_limit,
            self.config.similarity_threshold,
        )
        .await
    }

    /// Retrieval with a limit and threshold adapted to the query.
    pub async fn get_relevant_memories_adaptive(
        &self,
        user_id: &str,
        context: &str,
    ) -> Vec<ScoredMemory> {
        let count = match db::count_user_memories(&self.db, user_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "Memory count failed");
                return Vec::new();
            }
        };

        let plan = RetrievalPlan::for_context(context, count, &self.config);
        debug!(user_id, ?plan, "Adaptive retrieval plan");

        self.get_relevant_memories(user_id, context, plan.limit, plan.similarity_threshold)
            .await
    }

    /// Record access in the background, like search hit tracking.
    fn track_access(&self, ids: Vec<String>) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = db::record_access(&db, &ids).await {
                warn!(error = %e, count = ids.len(), "Failed to record memory access");
            }
        });
    }

    // =========================================================================
    // Explicit user actions
    // =========================================================================

    /// Fetch one memory, checking ownership.
    pub async fn get_memory(&self, user_id: &str, memory_id: &str) -> Result<Memory> {
        self.owned_memory(user_id, memory_id).await
    }

    /// Edit a memory. New content re-derives tags, hash and embedding.
    pub async fn update_memory(
        &self,
        user_id: &str,
        memory_id: &str,
        update: MemoryUpdate,
    ) -> Result<Memory> {
        let existing = self.owned_memory(user_id, memory_id).await?;
        let mut changes = UpdateMemory {
            memory_type: update.memory_type,
            importance_score: update.importance_score,
            ..Default::default()
        };

        if let Some(content) = update.content {
            validate_input(user_id, &content, ValidationLevel::Basic)?;
            let content = content.trim().to_string();
            let memory_type = update.memory_type.unwrap_or(existing.memory_type);

            changes.semantic_tags = Some(extract_semantic_tags(&content));
            if changes.importance_score.is_none() {
                changes.importance_score = Some(calculate_importance_score(&content, memory_type));
            }
            changes.embedding = Some(self.embed_best_effort(&content).await);
            changes.content_hash = Some(content_hash(&content));
            changes.content = Some(content);
        }

        let updated = db::update_memory(&self.db, &existing.id, changes).await?;
        info!(memory_id, user_id, "Updated memory");
        Ok(updated)
    }

    /// Delete a memory, checking ownership.
    pub async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<()> {
        self.owned_memory(user_id, memory_id).await?;
        db::delete_memory(&self.db, memory_id).await?;
        metrics::counter!("recall_memories_deleted_total").increment(1);
        info!(memory_id, user_id, "Deleted memory");
        Ok(())
    }

    /// List a user's memories.
    pub async fn list_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        if filter.user_id.trim().is_empty() {
            return Err(Error::Validation("user_id is required".into()));
        }
        db::list_memories(&self.db, filter).await
    }

    /// Totals by type, embedded and archived counts.
    pub async fn memory_stats(&self, user_id: &str) -> Result<MemoryStats> {
        db::memory_stats(&self.db, user_id).await
    }
}

fn validate_input(user_id: &str, content: &str, level: ValidationLevel) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::Validation("user_id is required".into()));
    }

    let content = content.trim();
    if content.is_empty() {
        return Err(Error::Validation("content must not be empty".into()));
    }

    if level == ValidationLevel::Strict {
        let chars = content.chars().count();
        if chars < MIN_CONTENT_CHARS {
            return Err(Error::Validation(format!(
                "content must be at least {} characters",
                MIN_CONTENT_CHARS
            )));
        }
        if chars > MAX_CONTENT_CHARS {
            return Err(Error::Validation(format!(
                "content must be at most {} characters",
                MAX_CONTENT_CHARS
            )));
        }
    }

    Ok(())
}
