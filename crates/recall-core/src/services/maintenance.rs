//! Periodic upkeep of a user's memory store: pruning, decay, optimization
//! runs, efficiency metrics and embedding backfill.

use chrono::Utc;
use recall_embeddings::TextEmbedder;
use recall_models::{EfficiencyMetrics, OptimizationReport, ARCHIVED_RELEVANCE};
use tracing::{debug, info, warn};

use super::decay::{decayed_relevance, DecayConfig};
use super::dedup::count_near_duplicates;
use super::memory::MemoryService;
use crate::db;
use crate::Result;

/// Relevance below which a memory counts as low in the efficiency metrics.
pub const LOW_RELEVANCE_THRESHOLD: f64 = 0.3;

impl MemoryService {
    /// Archive stale, unused, low-relevance memories.
    ///
    /// A memory is archived (relevance set to the archive score) only when
    /// its relevance is below `relevance_threshold`, it has not been accessed
    /// (or, if never accessed, created) for more than the configured number
    /// of days, and it has been accessed fewer than the configured number of
    /// times. Already archived memories are skipped.
    pub async fn prune_low_relevance_memories(
        &self,
        user_id: &str,
        relevance_threshold: f64,
    ) -> Result<usize> {
        let now = Utc::now();
        let memories = db::list_user_memories(&self.db, user_id).await?;
        let mut pruned = 0usize;
        let mut failures = 0usize;

        for memory in memories.iter().filter(|m| {
            !m.is_archived()
                && m.relevance_score < relevance_threshold
                && m.days_since_last_access(now) > self.config.prune_min_age_days as f64
                && m.access_count < self.config.prune_max_access_count
        }) {
            match db::set_relevance(&self.db, &memory.id, ARCHIVED_RELEVANCE).await {
                Ok(()) => pruned += 1,
                Err(e) => {
                    warn!(memory_id = %memory.id, error = %e, "Failed to archive memory");
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            metrics::counter!("recall_maintenance_failures_total", "step" => "prune")
                .increment(failures as u64);
        }
        metrics::counter!("recall_memories_pruned_total").increment(pruned as u64);

        info!(user_id, pruned, failures, "Pruned low-relevance memories");
        Ok(pruned)
    }

    /// Recompute relevance from age and access history. Returns the number
    /// of memories whose relevance changed.
    pub async fn apply_relevance_decay(&self, user_id: &str) -> Result<usize> {
        let now = Utc::now();
        let decay = DecayConfig::new(self.config.decay_half_life_days);
        let memories = db::list_user_memories(&self.db, user_id).await?;
        let mut decayed = 0usize;

        for memory in &memories {
            let Some(next) = decayed_relevance(memory, now, &decay) else {
                continue;
            };
            match db::set_relevance(&self.db, &memory.id, next).await {
                Ok(()) => decayed += 1,
                Err(e) => {
                    warn!(memory_id = %memory.id, error = %e, "Failed to update relevance");
                    metrics::counter!("recall_maintenance_failures_total", "step" => "decay")
                        .increment(1);
                }
            }
        }

        debug!(user_id, decayed, "Applied relevance decay");
        Ok(decayed)
    }

    /// Prune, consolidate, then decay, with the configured thresholds.
    pub async fn optimize_memory_system(&self, user_id: &str) -> Result<OptimizationReport> {
        let pruned = self
            .prune_low_relevance_memories(user_id, self.config.prune_threshold)
            .await?;
        let consolidated = self
            .consolidate_similar_memories(user_id, self.config.consolidation_threshold)
            .await?;
        let decayed = self.apply_relevance_decay(user_id).await?;
        let total_memories = db::count_user_memories(&self.db, user_id).await? as usize;

        let report = OptimizationReport {
            pruned,
            consolidated,
            decayed,
            total_memories,
        };

        info!(user_id, ?report, "Optimized memory system");
        Ok(report)
    }

    /// Health snapshot of a user's store.
    ///
    /// `efficiency_score = 100 * (0.5 * avg relevance + 0.3 * (1 - low share)
    /// + 0.2 * (1 - duplicate share))`, clamped to `[0, 100]`. An empty store
    /// scores 100.
    pub async fn get_memory_efficiency_metrics(&self, user_id: &str) -> Result<EfficiencyMetrics> {
        let memories = db::list_user_memories(&self.db, user_id).await?;
        let total = memories.len();

        if total == 0 {
            return Ok(EfficiencyMetrics {
                efficiency_score: 100.0,
                ..Default::default()
            });
        }

        let avg_relevance =
            memories.iter().map(|m| m.relevance_score).sum::<f64>() / total as f64;
        let low_relevance_count = memories
            .iter()
            .filter(|m| m.relevance_score < LOW_RELEVANCE_THRESHOLD)
            .count();
        let duplicate_count = count_near_duplicates(&memories, self.config.dedup_threshold);

        let n = total as f64;
        let score = 100.0
            * (0.5 * avg_relevance
                + 0.3 * (1.0 - low_relevance_count as f64 / n)
                + 0.2 * (1.0 - duplicate_count as f64 / n));

        Ok(EfficiencyMetrics {
            total_memories: total,
            avg_relevance_score: avg_relevance,
            low_relevance_count,
            duplicate_count,
            efficiency_score: score.clamp(0.0, 100.0),
        })
    }

    /// Embed rows stored while the provider was unavailable.
    ///
    /// Processes at most `limit` rows, for one user or across all users, in a
    /// single embedding request. Returns the number of rows that now have an
    /// embedding.
    pub async fn backfill_embeddings(&self, user_id: Option<&str>, limit: usize) -> Result<usize> {
        let pending =
            db::list_memories_without_embedding(&self.db, user_id, limit as i64).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|m| m.content.clone()).collect();
        let embeddings = match self.embedder.embed_texts(&texts).await {
            Ok(embeddings) if embeddings.len() == pending.len() => embeddings,
            Ok(embeddings) => {
                warn!(
                    expected = pending.len(),
                    got = embeddings.len(),
                    "Embedding provider returned wrong number of vectors"
                );
                metrics::counter!("recall_provider_failures_total", "provider" => "embedding")
                    .increment(1);
                return Ok(0);
            }
            // Provider is down; rows stay pending for the next run.
            Err(e) => {
                warn!(pending = pending.len(), error = %e, "Backfill embedding failed");
                metrics::counter!("recall_provider_failures_total", "provider" => "embedding")
                    .increment(1);
                return Ok(0);
            }
        };

        let mut filled = 0usize;
        for (memory, embedding) in pending.iter().zip(&embeddings) {
            if embedding.is_empty() {
                continue;
            }
            match db::set_embedding(&self.db, &memory.id, embedding).await {
                Ok(()) => filled += 1,
                Err(e) => warn!(memory_id = %memory.id, error = %e, "Failed to store embedding"),
            }
        }

        info!(
            user_id = user_id.unwrap_or("*"),
            pending = pending.len(),
            filled,
            "Backfilled embeddings"
        );
        Ok(filled)
    }
}
