//! Maintenance reports and store statistics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Outcome of a full optimization run for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Memories archived by pruning.
    pub pruned: usize,
    /// Memories merged into another during consolidation.
    pub consolidated: usize,
    /// Memories whose relevance changed during the decay pass.
    pub decayed: usize,
    /// Memories left after the run.
    pub total_memories: usize,
}

/// Health snapshot of a user's memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub total_memories: usize,
    pub avg_relevance_score: f64,
    pub low_relevance_count: usize,
    pub duplicate_count: usize,
    /// Weighted blend scaled to 0-100.
    pub efficiency_score: f64,
}

/// Counts for an explicit "stats" request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: i64,
    pub by_type: HashMap<String, i64>,
    pub embedded: i64,
    pub archived: i64,
    pub average_importance: f64,
}
