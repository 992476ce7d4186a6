//! Near-duplicate detection, consolidation and removal.
//!
//! Both batch passes walk a user's memories in creation order and compare
//! pairwise (O(n^2) per user). Failures on individual rows are logged and
//! counted; the pass carries on.

use recall_models::{Memory, SimilarMemory};
use tracing::{debug, info, warn};

use super::memory::{content_hash, MemoryService, MERGE_SEPARATOR};
use crate::db::vector::cosine_similarity;
use crate::db::{self, UpdateMemory};
use crate::Result;

fn similarity(a: &Memory, b: &Memory) -> Option<f32> {
    Some(cosine_similarity(a.embedding.as_deref()?, b.embedding.as_deref()?))
}

/// Memories (in the given order) that have an earlier near-duplicate.
pub(crate) fn count_near_duplicates(memories: &[Memory], threshold: f32) -> usize {
    (1..memories.len())
        .filter(|&j| {
            (0..j).any(|i| similarity(&memories[i], &memories[j]).is_some_and(|s| s >= threshold))
        })
        .count()
}

impl MemoryService {
    /// Stored memories similar to `content`, most similar first.
    ///
    /// A memory with identical content is returned too. Yields an empty list
    /// when `content` cannot be embedded.
    pub async fn find_similar_memories(
        &self,
        user_id: &str,
        content: &str,
        threshold: f32,
    ) -> Result<Vec<SimilarMemory>> {
        if user_id.trim().is_empty() || content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let Some(query) = self.embed_best_effort(content).await else {
            return Ok(Vec::new());
        };

        let hits = db::search_similar(&self.db, user_id, &query, threshold, usize::MAX).await?;

        Ok(hits
            .into_iter()
            .map(|(memory, similarity)| SimilarMemory {
                id: memory.id,
                content: memory.content,
                similarity,
            })
            .collect())
    }

    /// Merge groups of similar memories into their oldest member.
    ///
    /// Each memory takes part in at most one merge. Returns the number of
    /// memories merged away (deleted).
    pub async fn consolidate_similar_memories(&self, user_id: &str, threshold: f32) -> Result<usize> {
        let memories = db::list_user_memories(&self.db, user_id).await?;
        let mut processed = vec![false; memories.len()];
        let mut merged = 0usize;
        let mut failures = 0usize;

        for i in 0..memories.len() {
            if processed[i] {
                continue;
            }
            processed[i] = true;

            let group: Vec<usize> = ((i + 1)..memories.len())
                .filter(|&j| {
                    !processed[j]
                        && similarity(&memories[i], &memories[j]).is_some_and(|s| s >= threshold)
                })
                .collect();

            if group.is_empty() {
                continue;
            }
            for &j in &group {
                processed[j] = true;
            }

            let members: Vec<&Memory> = group.iter().map(|&j| &memories[j]).collect();
            match self.merge_group(&memories[i], &members).await {
                Ok((removed, failed)) => {
                    merged += removed;
                    failures += failed;
                }
                Err(e) => {
                    warn!(memory_id = %memories[i].id, error = %e, "Failed to consolidate memory group");
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            metrics::counter!("recall_maintenance_failures_total", "step" => "consolidate")
                .increment(failures as u64);
        }
        metrics::counter!("recall_memories_consolidated_total").increment(merged as u64);

        info!(user_id, merged, failures, "Consolidated similar memories");
        Ok(merged)
    }

    /// Fold `members` into `survivor`, then delete them.
    ///
    /// Returns (deleted, failed deletions).
    async fn merge_group(&self, survivor: &Memory, members: &[&Memory]) -> Result<(usize, usize)> {
        let mut content = survivor.content.clone();
        let mut tags = survivor.semantic_tags.clone();
        let mut importance = survivor.importance_score;
        let mut relevance = survivor.relevance_score;

        for member in members {
            if !content.contains(&member.content) {
                content.push_str(MERGE_SEPARATOR);
                content.push_str(&member.content);
            }
            for tag in &member.semantic_tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            importance = importance.max(member.importance_score);
            relevance = relevance.max(member.relevance_score);
        }

        let content_changed = content != survivor.content;
        let embedding = if content_changed {
            self.embed_best_effort(&content).await.map(Some)
        } else {
            None
        };

        db::update_memory(
            &self.db,
            &survivor.id,
            UpdateMemory {
                content_hash: content_changed.then(|| content_hash(&content)),
                content: content_changed.then_some(content),
                embedding,
                semantic_tags: Some(tags),
                importance_score: Some(importance),
                relevance_score: Some(relevance),
                ..Default::default()
            },
        )
        .await?;

        let mut deleted = 0;
        let mut failed = 0;
        for member in members {
            match db::delete_memory(&self.db, &member.id).await {
                Ok(()) => {
                    debug!(survivor = %survivor.id, merged = %member.id, "Merged memory");
                    deleted += 1;
                }
                Err(e) => {
                    warn!(memory_id = %member.id, error = %e, "Failed to delete merged memory");
                    failed += 1;
                }
            }
        }

        Ok((deleted, failed))
    }

    /// Delete near-identical memories, keeping the more relevant one.
    ///
    /// Relevance ties keep the earlier-created memory. Running it twice
    /// removes nothing the second time.
    pub async fn remove_duplicate_memories(&self, user_id: &str, threshold: f32) -> Result<usize> {
        let memories = db::list_user_memories(&self.db, user_id).await?;
        let mut deleted = vec![false; memories.len()];
        let mut removed = 0usize;
        let mut failures = 0usize;

        for i in 0..memories.len() {
            if deleted[i] || !memories[i].is_embedded() {
                continue;
            }

            for j in 0..memories.len() {
                if j == i || deleted[j] {
                    continue;
                }
                if !similarity(&memories[i], &memories[j]).is_some_and(|s| s >= threshold) {
                    continue;
                }

                let (a, b) = (&memories[i], &memories[j]);
                let loser = if b.relevance_score > a.relevance_score {
                    i
                } else if b.relevance_score < a.relevance_score {
                    j
                } else {
                    i.max(j)
                };

                match db::delete_memory(&self.db, &memories[loser].id).await {
                    Ok(()) => {
                        deleted[loser] = true;
                        removed += 1;
                        debug!(
                            removed = %memories[loser].id,
                            kept = %memories[if loser == i { j } else { i }].id,
                            "Removed duplicate memory"
                        );
                        if loser == i {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(memory_id = %memories[loser].id, error = %e, "Failed to delete duplicate memory");
                        failures += 1;
                    }
                }
            }
        }

        if failures > 0 {
            metrics::counter!("recall_maintenance_failures_total", "step" => "dedup")
                .increment(failures as u64);
        }

        info!(user_id, removed, failures, "Removed duplicate memories");
        Ok(removed)
    }
}
