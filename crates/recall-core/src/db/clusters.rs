//! Memory cluster queries.

use chrono::{DateTime, Utc};
use recall_models::MemoryCluster;
use sqlx::FromRow;

use super::vector::{bytes_to_embedding, embedding_to_bytes};
use super::DbPool;
use crate::Result;

#[derive(Debug, FromRow)]
struct ClusterRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    centroid: Option<Vec<u8>>,
    memory_count: i64,
    average_relevance_score: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ClusterRow> for MemoryCluster {
    fn from(row: ClusterRow) -> Self {
        MemoryCluster {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            centroid: row
                .centroid
                .map(|b| bytes_to_embedding(&b))
                .filter(|c| !c.is_empty()),
            memory_count: row.memory_count,
            average_relevance_score: row.average_relevance_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A cluster together with the ids of its members.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub cluster: MemoryCluster,
    pub member_ids: Vec<String>,
}

/// List a user's clusters, largest first.
pub async fn list_clusters(pool: &DbPool, user_id: &str) -> Result<Vec<MemoryCluster>> {
    let rows = sqlx::query_as::<_, ClusterRow>(
        r#"
        SELECT * FROM memory_clusters
        WHERE user_id = ?
        ORDER BY memory_count DESC, name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MemoryCluster::from).collect())
}

/// Atomically replace a user's clusters and member assignments.
///
/// Memories not named in any assignment end up with `cluster_id = NULL`.
pub async fn replace_clusters(
    pool: &DbPool,
    user_id: &str,
    assignments: &[ClusterAssignment],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE memories SET cluster_id = NULL WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM memory_clusters WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    for assignment in assignments {
        let cluster = &assignment.cluster;
        sqlx::query(
            r#"
            INSERT INTO memory_clusters (
                id, user_id, name, description, centroid, memory_count,
                average_relevance_score, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cluster.id)
        .bind(user_id)
        .bind(&cluster.name)
        .bind(&cluster.description)
        .bind(cluster.centroid.as_deref().map(embedding_to_bytes))
        .bind(cluster.memory_count)
        .bind(cluster.average_relevance_score)
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .execute(&mut *tx)
        .await?;

        for member_id in &assignment.member_ids {
            sqlx::query("UPDATE memories SET cluster_id = ? WHERE id = ? AND user_id = ?")
                .bind(&cluster.id)
                .bind(member_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}
