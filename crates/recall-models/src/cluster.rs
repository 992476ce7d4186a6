//! Memory cluster model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named group of semantically related memories for one user.
///
/// Clusters are rebuilt by maintenance; `memory_count` and
/// `average_relevance_score` are denormalized for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCluster {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Mean of the member embeddings.
    #[serde(default, skip_serializing)]
    pub centroid: Option<Vec<f32>>,
    pub memory_count: i64,
    pub average_relevance_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
