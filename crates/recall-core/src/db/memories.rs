//! Memory database queries.
//!
//! Rows carry the embedding as a BLOB and the tags as a JSON array; both are
//! decoded into [`recall_models::Memory`] on the way out.

use chrono::{DateTime, Utc};
use recall_models::{Memory, MemoryStats, MemoryType, ARCHIVED_RELEVANCE};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::vector::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use super::DbPool;
use crate::{Error, Result};

/// Relevance gained each time retrieval surfaces a memory, capped at 1.0.
pub const ACCESS_RELEVANCE_BOOST: f64 = 0.05;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, FromRow)]
struct MemoryRow {
    id: String,
    user_id: String,
    content: String,
    content_hash: Option<String>,
    embedding: Option<Vec<u8>>,
    relevance_score: f64,
    access_count: i64,
    last_accessed: Option<DateTime<Utc>>,
    semantic_tags: Option<String>, // JSON array
    memory_type: String,
    importance_score: f64,
    cluster_id: Option<String>,
    source: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MemoryRow> for Memory {
    fn from(row: MemoryRow) -> Self {
        Memory {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            embedding: row
                .embedding
                .map(|bytes| bytes_to_embedding(&bytes))
                .filter(|e| !e.is_empty()),
            relevance_score: row.relevance_score,
            access_count: row.access_count,
            last_accessed: row.last_accessed,
            semantic_tags: row
                .semantic_tags
                .as_deref()
                .and_then(|t| serde_json::from_str(t).ok())
                .unwrap_or_default(),
            memory_type: MemoryType::from_str(&row.memory_type).unwrap_or_default(),
            importance_score: row.importance_score,
            cluster_id: row.cluster_id,
            source: row.source,
            content_hash: row.content_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Partial update of a memory. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateMemory {
    pub content: Option<String>,
    pub content_hash: Option<String>,
    /// `Some(None)` clears a stale embedding so backfill picks the row up again.
    pub embedding: Option<Option<Vec<f32>>>,
    pub semantic_tags: Option<Vec<String>>,
    pub memory_type: Option<MemoryType>,
    pub importance_score: Option<f64>,
    pub relevance_score: Option<f64>,
    pub source: Option<String>,
}

impl UpdateMemory {
    fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.content_hash.is_none()
            && self.embedding.is_none()
            && self.semantic_tags.is_none()
            && self.memory_type.is_none()
            && self.importance_score.is_none()
            && self.relevance_score.is_none()
            && self.source.is_none()
    }
}

/// Filter options for listing one user's memories.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub user_id: String,
    pub memory_type: Option<MemoryType>,
    pub source: Option<String>,
    /// Exact tag match.
    pub tag: Option<String>,
    /// Substring match on content.
    pub search_query: Option<String>,
    pub min_relevance: Option<f64>,
    /// Archived memories are hidden unless this is set.
    pub include_archived: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MemoryFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Insert a fully built memory.
pub async fn insert_memory(pool: &DbPool, memory: &Memory) -> Result<Memory> {
    let tags_json = serde_json::to_string(&memory.semantic_tags)?;
    let embedding = memory.embedding.as_deref().map(embedding_to_bytes);

    let row = sqlx::query_as::<_, MemoryRow>(
        r#"
        INSERT INTO memories (
            id, user_id, content, content_hash, embedding, relevance_score,
            access_count, last_accessed, semantic_tags, memory_type,
            importance_score, cluster_id, source, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&memory.id)
    .bind(&memory.user_id)
    .bind(&memory.content)
    .bind(&memory.content_hash)
    .bind(embedding)
    .bind(memory.relevance_score)
    .bind(memory.access_count)
    .bind(memory.last_accessed)
    .bind(tags_json)
    .bind(memory.memory_type.as_str())
    .bind(memory.importance_score)
    .bind(&memory.cluster_id)
    .bind(&memory.source)
    .bind(memory.created_at)
    .bind(memory.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get a memory by ID.
pub async fn get_memory(pool: &DbPool, id: &str) -> Result<Memory> {
    get_memory_optional(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Memory not found: {}", id)))
}

/// Get a memory by ID (optional).
pub async fn get_memory_optional(pool: &DbPool, id: &str) -> Result<Option<Memory>> {
    let row = sqlx::query_as::<_, MemoryRow>("SELECT * FROM memories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Memory::from))
}

/// Oldest memory of a user with exactly this content hash.
pub async fn find_memory_by_hash(
    pool: &DbPool,
    user_id: &str,
    content_hash: &str,
) -> Result<Option<Memory>> {
    let row = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE user_id = ? AND content_hash = ?
        ORDER BY created_at ASC, rowid ASC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Memory::from))
}

/// Apply a partial update and bump `updated_at`.
pub async fn update_memory(pool: &DbPool, id: &str, input: UpdateMemory) -> Result<Memory> {
    if input.is_empty() {
        return get_memory(pool, id).await;
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE memories SET ");
    let mut fields = qb.separated(", ");

    if let Some(content) = input.content {
        fields.push("content = ").push_bind_unseparated(content);
    }
    if let Some(hash) = input.content_hash {
        fields.push("content_hash = ").push_bind_unseparated(hash);
    }
    if let Some(embedding) = input.embedding {
        let bytes = embedding.as_deref().map(embedding_to_bytes);
        fields.push("embedding = ").push_bind_unseparated(bytes);
    }
    if let Some(tags) = input.semantic_tags {
        fields
            .push("semantic_tags = ")
            .push_bind_unseparated(serde_json::to_string(&tags)?);
    }
    if let Some(memory_type) = input.memory_type {
        fields
            .push("memory_type = ")
            .push_bind_unseparated(memory_type.as_str());
    }
    if let Some(importance) = input.importance_score {
        fields
            .push("importance_score = ")
            .push_bind_unseparated(importance.clamp(0.0, 1.0));
    }
    if let Some(relevance) = input.relevance_score {
        fields
            .push("relevance_score = ")
            .push_bind_unseparated(relevance.clamp(0.0, 1.0));
    }
    if let Some(source) = input.source {
        fields.push("source = ").push_bind_unseparated(source);
    }
    fields.push("updated_at = ").push_bind_unseparated(Utc::now());

    qb.push(" WHERE id = ")
        .push_bind(id.to_string())
        .push(" RETURNING *");

    qb.build_query_as::<MemoryRow>()
        .fetch_optional(pool)
        .await?
        .map(Memory::from)
        .ok_or_else(|| Error::NotFound(format!("Memory not found: {}", id)))
}

/// Overwrite the relevance score without touching `updated_at`.
///
/// Decay is measured from `updated_at`, so maintenance writes must not
/// reset the clock.
pub async fn set_relevance(pool: &DbPool, id: &str, relevance_score: f64) -> Result<()> {
    sqlx::query("UPDATE memories SET relevance_score = ? WHERE id = ?")
        .bind(relevance_score.clamp(0.0, 1.0))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Store an embedding for an existing row (backfill).
pub async fn set_embedding(pool: &DbPool, id: &str, embedding: &[f32]) -> Result<()> {
    let result = sqlx::query("UPDATE memories SET embedding = ? WHERE id = ?")
        .bind(embedding_to_bytes(embedding))
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Memory not found: {}", id)));
    }
    Ok(())
}

/// Bump access bookkeeping for memories surfaced by retrieval and nudge
/// their relevance up.
pub async fn record_access(pool: &DbPool, ids: &[String]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut updated = 0;

    for id in ids {
        let result = sqlx::query(
            r#"
            UPDATE memories SET
                access_count = access_count + 1,
                last_accessed = ?,
                relevance_score = MIN(1.0, relevance_score + ?)
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(ACCESS_RELEVANCE_BOOST)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }

    tx.commit().await?;
    Ok(updated)
}

/// Delete a memory.
pub async fn delete_memory(pool: &DbPool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM memories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Memory not found: {}", id)));
    }

    Ok(())
}

/// All memories of a user in creation order (oldest first).
pub async fn list_user_memories(pool: &DbPool, user_id: &str) -> Result<Vec<Memory>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE user_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Memory::from).collect())
}

/// Memories of a user that take part in similarity search.
pub async fn list_embedded_memories(pool: &DbPool, user_id: &str) -> Result<Vec<Memory>> {
    let rows = sqlx::query_as::<_, MemoryRow>(
        r#"
        SELECT * FROM memories
        WHERE user_id = ? AND embedding IS NOT NULL
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(Memory::from)
        .filter(Memory::is_embedded)
        .collect())
}

/// Count a user's memories.
pub async fn count_user_memories(pool: &DbPool, user_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Nearest neighbours of `query` among a user's embedded memories.
///
/// Returns `(memory, similarity)` pairs with similarity at or above
/// `threshold`, most similar first, at most `limit` of them.
pub async fn search_similar(
    pool: &DbPool,
    user_id: &str,
    query: &[f32],
    threshold: f32,
    limit: usize,
) -> Result<Vec<(Memory, f32)>> {
    if limit == 0 || query.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(Memory, f32)> = list_embedded_memories(pool, user_id)
        .await?
        .into_iter()
        .filter_map(|memory| {
            let similarity = memory
                .embedding
                .as_deref()
                .map(|e| cosine_similarity(query, e))?;
            (similarity >= threshold).then_some((memory, similarity))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    Ok(scored)
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// List a user's memories with filters, most recently updated first.
pub async fn list_memories(pool: &DbPool, filter: &MemoryFilter) -> Result<Vec<Memory>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM memories WHERE user_id = ");
    qb.push_bind(filter.user_id.clone());

    if let Some(memory_type) = filter.memory_type {
        qb.push(" AND memory_type = ").push_bind(memory_type.as_str());
    }

    if let Some(source) = &filter.source {
        qb.push(" AND source = ").push_bind(source.clone());
    }

    if let Some(tag) = &filter.tag {
        // JSON array membership
        qb.push(" AND semantic_tags LIKE ")
            .push_bind(format!("%\"{}\"%", escape_like(tag)))
            .push(" ESCAPE '\\'");
    }

    if let Some(search) = &filter.search_query {
        qb.push(" AND content LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }

    if let Some(min) = filter.min_relevance {
        qb.push(" AND relevance_score >= ").push_bind(min);
    }

    if !filter.include_archived {
        qb.push(" AND relevance_score > ")
            .push_bind(ARCHIVED_RELEVANCE + f64::EPSILON);
    }

    qb.push(" ORDER BY updated_at DESC, rowid DESC LIMIT ")
        .push_bind(filter.limit.unwrap_or(100))
        .push(" OFFSET ")
        .push_bind(filter.offset.unwrap_or(0));

    let rows = qb.build_query_as::<MemoryRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Memory::from).collect())
}

/// Rows still waiting for an embedding, oldest first.
pub async fn list_memories_without_embedding(
    pool: &DbPool,
    user_id: Option<&str>,
    limit: i64,
) -> Result<Vec<Memory>> {
    let rows = match user_id {
        Some(user_id) => {
            sqlx::query_as::<_, MemoryRow>(
                r#"
                SELECT * FROM memories
                WHERE user_id = ? AND embedding IS NULL
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MemoryRow>(
                r#"
                SELECT * FROM memories
                WHERE embedding IS NULL
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(Memory::from).collect())
}

/// Every user that owns at least one memory.
pub async fn list_memory_owners(pool: &DbPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT user_id FROM memories ORDER BY user_id")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Aggregate counts for one user.
pub async fn memory_stats(pool: &DbPool, user_id: &str) -> Result<MemoryStats> {
    let (total, embedded, archived, average_importance): (i64, i64, i64, f64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN embedding IS NOT NULL THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN relevance_score <= ? THEN 1 ELSE 0 END), 0),
            COALESCE(AVG(importance_score), 0.0)
        FROM memories
        WHERE user_id = ?
        "#,
    )
    .bind(ARCHIVED_RELEVANCE + f64::EPSILON)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let by_type: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT memory_type, COUNT(*) FROM memories
        WHERE user_id = ?
        GROUP BY memory_type
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(MemoryStats {
        total,
        by_type: by_type.into_iter().collect(),
        embedded,
        archived,
        average_importance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, initialize_schema};

    async fn setup() -> DbPool {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    fn memory(user_id: &str, content: &str, embedding: Option<Vec<f32>>) -> Memory {
        let mut m = Memory::new(user_id, content);
        m.embedding = embedding;
        m.semantic_tags = vec!["alpha".into(), "beta".into()];
        m.memory_type = MemoryType::Technical;
        m
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let pool = setup().await;
        let m = memory("u1", "Uses Rust", Some(vec![1.0, 0.0, 0.5]));

        let stored = insert_memory(&pool, &m).await.unwrap();
        let fetched = get_memory(&pool, &m.id).await.unwrap();

        assert_eq!(stored.id, m.id);
        assert_eq!(fetched.embedding, Some(vec![1.0, 0.0, 0.5]));
        assert_eq!(fetched.semantic_tags, vec!["alpha", "beta"]);
        assert_eq!(fetched.memory_type, MemoryType::Technical);
        assert_eq!(fetched.created_at.timestamp(), m.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let pool = setup().await;
        let err = get_memory(&pool, "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(
            delete_memory(&pool, "nope").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_search_similar_is_user_scoped_and_ranked() {
        let pool = setup().await;
        insert_memory(&pool, &memory("u1", "a", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        insert_memory(&pool, &memory("u1", "b", Some(vec![0.8, 0.6])))
            .await
            .unwrap();
        insert_memory(&pool, &memory("u1", "c", Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        insert_memory(&pool, &memory("u2", "other", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        insert_memory(&pool, &memory("u1", "unembedded", None))
            .await
            .unwrap();

        let hits = search_similar(&pool, "u1", &[1.0, 0.0], 0.5, 10).await.unwrap();
        let contents: Vec<_> = hits.iter().map(|(m, _)| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert!(hits[0].1 > hits[1].1);

        let top = search_similar(&pool, "u1", &[1.0, 0.0], 0.0, 1).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn test_update_memory_partial() {
        let pool = setup().await;
        let m = insert_memory(&pool, &memory("u1", "old", Some(vec![1.0])))
            .await
            .unwrap();

        let updated = update_memory(
            &pool,
            &m.id,
            UpdateMemory {
                content: Some("new".into()),
                embedding: Some(None),
                importance_score: Some(1.7),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.content, "new");
        assert!(updated.embedding.is_none());
        assert_eq!(updated.importance_score, 1.0);
        assert_eq!(updated.semantic_tags, vec!["alpha", "beta"]);
        assert!(updated.updated_at >= m.updated_at);
    }

    #[tokio::test]
    async fn test_record_access_and_relevance() {
        let pool = setup().await;
        let mut m = memory("u1", "x", None);
        m.relevance_score = 0.5;
        let m = insert_memory(&pool, &m).await.unwrap();

        let n = record_access(&pool, &[m.id.clone(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(n, 1);
        let accessed = get_memory(&pool, &m.id).await.unwrap();
        assert!((accessed.relevance_score - (0.5 + ACCESS_RELEVANCE_BOOST)).abs() < 1e-9);

        set_relevance(&pool, &m.id, 0.42).await.unwrap();
        let fetched = get_memory(&pool, &m.id).await.unwrap();
        assert_eq!(fetched.access_count, 1);
        assert!(fetched.last_accessed.is_some());
        assert!((fetched.relevance_score - 0.42).abs() < 1e-9);
        assert_eq!(fetched.updated_at, m.updated_at);
    }

    #[tokio::test]
    async fn test_record_access_caps_relevance() {
        let pool = setup().await;
        let m = insert_memory(&pool, &memory("u1", "x", None)).await.unwrap();

        record_access(&pool, &[m.id.clone()]).await.unwrap();
        let fetched = get_memory(&pool, &m.id).await.unwrap();
        assert_eq!(fetched.relevance_score, 1.0);
    }

    #[tokio::test]
    async fn test_list_memories_filters() {
        let pool = setup().await;
        let mut archived = memory("u1", "archived fact", None);
        archived.relevance_score = ARCHIVED_RELEVANCE;
        insert_memory(&pool, &archived).await.unwrap();

        let mut pref = memory("u1", "likes tea", None);
        pref.memory_type = MemoryType::Preference;
        pref.semantic_tags = vec!["tea".into()];
        pref.source = Some("chat".into());
        insert_memory(&pool, &pref).await.unwrap();

        let all = list_memories(&pool, &MemoryFilter::for_user("u1")).await.unwrap();
        assert_eq!(all.len(), 1);

        let with_archived = list_memories(
            &pool,
            &MemoryFilter {
                include_archived: true,
                ..MemoryFilter::for_user("u1")
            },
        )
        .await
        .unwrap();
        assert_eq!(with_archived.len(), 2);

        let tagged = list_memories(
            &pool,
            &MemoryFilter {
                tag: Some("tea".into()),
                memory_type: Some(MemoryType::Preference),
                source: Some("chat".into()),
                ..MemoryFilter::for_user("u1")
            },
        )
        .await
        .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].content, "likes tea");
    }

    #[tokio::test]
    async fn test_list_memories_matches_wildcards_literally() {
        let pool = setup().await;
        let mut exact = memory("u1", "uses snake_case names", None);
        exact.semantic_tags = vec!["a_b".into()];
        insert_memory(&pool, &exact).await.unwrap();

        let mut lookalike = memory("u1", "uses snakeXcase names at 100%", None);
        lookalike.semantic_tags = vec!["axb".into()];
        insert_memory(&pool, &lookalike).await.unwrap();

        let tagged = list_memories(
            &pool,
            &MemoryFilter {
                tag: Some("a_b".into()),
                ..MemoryFilter::for_user("u1")
            },
        )
        .await
        .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].content, "uses snake_case names");

        let searched = list_memories(
            &pool,
            &MemoryFilter {
                search_query: Some("snake_case".into()),
                ..MemoryFilter::for_user("u1")
            },
        )
        .await
        .unwrap();
        assert_eq!(searched.len(), 1);

        let percent = list_memories(
            &pool,
            &MemoryFilter {
                search_query: Some("100%".into()),
                ..MemoryFilter::for_user("u1")
            },
        )
        .await
        .unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].content, "uses snakeXcase names at 100%");
    }

    #[tokio::test]
    async fn test_stats_and_owners() {
        let pool = setup().await;
        insert_memory(&pool, &memory("u1", "a", Some(vec![1.0])))
            .await
            .unwrap();
        insert_memory(&pool, &memory("u1", "b", None)).await.unwrap();
        insert_memory(&pool, &memory("u2", "c", None)).await.unwrap();

        let stats = memory_stats(&pool, "u1").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.archived, 0);
        assert_eq!(stats.by_type.get("technical"), Some(&2));

        assert_eq!(list_memory_owners(&pool).await.unwrap(), vec!["u1", "u2"]);
        assert_eq!(
            list_memories_without_embedding(&pool, Some("u1"), 10)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            list_memories_without_embedding(&pool, None, 10)
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
