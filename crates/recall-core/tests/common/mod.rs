//! Common test utilities and helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use recall_core::db::{self, DbPool};
use recall_core::{MemoryConfig, MemoryService, Summarizer};
use recall_embeddings::{EmbeddingConfig, EmbeddingService, TextEmbedder};
use recall_llm::TextCompleter;

/// Set up a fresh in-memory database with the schema applied.
pub async fn setup_pool() -> DbPool {
    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to init pool");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Embedding service with no providers: deterministic lexical vectors.
pub fn lexical_embedder() -> Arc<dyn TextEmbedder> {
    let config = EmbeddingConfig {
        providers: Vec::new(),
        dimension: 512,
    };
    Arc::new(EmbeddingService::from_config(&config).expect("Failed to build embedder"))
}

/// Memory service over the lexical embedder with summarization disabled.
pub async fn setup_service() -> MemoryService {
    let pool = setup_pool().await;
    service_with(pool, lexical_embedder(), Summarizer::disabled())
}

pub fn service_with(
    pool: DbPool,
    embedder: Arc<dyn TextEmbedder>,
    summarizer: Summarizer,
) -> MemoryService {
    MemoryService::new(pool, embedder, summarizer, MemoryConfig::default())
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    async fn embed_text(&self, _text: &str) -> recall_embeddings::Result<Vec<f32>> {
        Err(recall_embeddings::Error::AllProvidersFailed)
    }
}

/// Lexical embedder that can be switched off to simulate an outage.
pub struct SwitchableEmbedder {
    inner: Arc<dyn TextEmbedder>,
    pub down: AtomicBool,
    pub calls: AtomicUsize,
}

impl SwitchableEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: lexical_embedder(),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextEmbedder for SwitchableEmbedder {
    async fn embed_text(&self, text: &str) -> recall_embeddings::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(recall_embeddings::Error::Provider("simulated outage".into()));
        }
        self.inner.embed_text(text).await
    }
}

/// Lexical embedder that counts single and batch requests.
pub struct CountingEmbedder {
    inner: Arc<dyn TextEmbedder>,
    pub singles: AtomicUsize,
    pub batches: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: lexical_embedder(),
            singles: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextEmbedder for CountingEmbedder {
    async fn embed_text(&self, text: &str) -> recall_embeddings::Result<Vec<f32>> {
        self.singles.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_text(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> recall_embeddings::Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_texts(texts).await
    }
}

/// Completer returning a fixed reply.
pub struct StubCompleter(pub String);

#[async_trait]
impl TextCompleter for StubCompleter {
    async fn complete(&self, _system: &str, _user: &str) -> recall_llm::Result<String> {
        Ok(self.0.clone())
    }
}

/// Completer that always fails.
pub struct FailingCompleter;

#[async_trait]
impl TextCompleter for FailingCompleter {
    async fn complete(&self, _system: &str, _user: &str) -> recall_llm::Result<String> {
        Err(recall_llm::Error::NoProviders)
    }
}

/// Move a memory's timestamps `days` into the past and clear its access time.
pub async fn backdate(pool: &DbPool, memory_id: &str, days: i64) {
    backdate_by(pool, memory_id, chrono::Duration::days(days)).await;
}

/// Move a memory's timestamps `age` into the past and clear its access time.
pub async fn backdate_by(pool: &DbPool, memory_id: &str, age: chrono::Duration) {
    let at = Utc::now() - age;
    sqlx::query(
        "UPDATE memories SET created_at = ?, updated_at = ?, last_accessed = NULL WHERE id = ?",
    )
    .bind(at)
    .bind(at)
    .bind(memory_id)
    .execute(pool)
    .await
    .expect("Failed to backdate memory");
}

/// Set stored scores directly.
pub async fn set_scores(pool: &DbPool, memory_id: &str, relevance: f64, access_count: i64) {
    sqlx::query("UPDATE memories SET relevance_score = ?, access_count = ? WHERE id = ?")
        .bind(relevance)
        .bind(access_count)
        .bind(memory_id)
        .execute(pool)
        .await
        .expect("Failed to set scores");
}

/// Poll until the memory's access count reaches `expected`.
pub async fn wait_for_access_count(pool: &DbPool, memory_id: &str, expected: i64) -> i64 {
    let mut last = 0;
    for _ in 0..50 {
        last = db::get_memory(pool, memory_id)
            .await
            .expect("memory should exist")
            .access_count;
        if last >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    last
}
