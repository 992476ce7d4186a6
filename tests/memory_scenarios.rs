//! End-to-end memory scenarios over an in-memory store and the lexical
//! placeholder embedder.

use std::sync::Arc;

use chrono::{Duration, Utc};
use recall_core::db;
use recall_core::services::{determine_memory_type, should_summarize};
use recall_core::{Memory, MemoryConfig, MemoryService, MemoryType, SaveOptions, Summarizer};
use recall_embeddings::{EmbeddingConfig, EmbeddingService};

async fn setup() -> MemoryService {
    let pool = db::init_pool(":memory:").await.expect("Failed to init pool");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");

    let embedder = EmbeddingService::from_config(&EmbeddingConfig {
        providers: Vec::new(),
        dimension: 1024,
    })
    .expect("Failed to build embedder");

    MemoryService::new(
        pool,
        Arc::new(embedder),
        Summarizer::disabled(),
        MemoryConfig::default(),
    )
}

#[tokio::test]
async fn test_name_question_finds_name_fact() {
    let service = setup().await;
    for fact in [
        "My name is John",
        "I prefer TypeScript",
        "I like hiking",
    ] {
        service
            .save_memory("user-1", fact, SaveOptions::from_source("chat"))
            .await
            .unwrap();
    }

    let results = service
        .get_relevant_memories("user-1", "What is my name?", 1, 0.1)
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.content, "My name is John");
}

#[tokio::test]
async fn test_round_trip_and_isolation() {
    let service = setup().await;
    let saved = service
        .save_memory("user-1", "My sister lives in Toronto", SaveOptions::default())
        .await
        .unwrap();

    let mine = service
        .get_relevant_memories("user-1", "My sister lives in Toronto", 5, 0.3)
        .await;
    assert!(mine.iter().any(|r| r.memory.id == saved.id));

    let theirs = service
        .get_relevant_memories("user-2", "My sister lives in Toronto", 5, 0.0)
        .await;
    assert!(theirs.is_empty());
}

#[tokio::test]
async fn test_saving_twice_keeps_one_row() {
    let service = setup().await;
    for _ in 0..2 {
        service
            .save_memory("user-1", "I am allergic to peanuts", SaveOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(db::count_user_memories(service.pool(), "user-1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_removal_is_idempotent() {
    let service = setup().await;
    let now = Utc::now();
    for (i, relevance) in [0.4, 0.9, 0.6].into_iter().enumerate() {
        let mut memory = Memory::new("user-1", format!("copy {i}"));
        memory.embedding = Some(vec![1.0, 0.0, 0.001 * i as f32]);
        memory.relevance_score = relevance;
        memory.created_at = now - Duration::minutes(10 - i as i64);
        db::insert_memory(service.pool(), &memory).await.unwrap();
    }

    assert_eq!(service.remove_duplicate_memories("user-1", 0.95).await.unwrap(), 2);
    assert_eq!(service.remove_duplicate_memories("user-1", 0.95).await.unwrap(), 0);

    let left = db::list_user_memories(service.pool(), "user-1").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].content, "copy 1");
}

#[tokio::test]
async fn test_prune_needs_low_relevance_age_and_few_accesses() {
    let service = setup().await;
    let old = Utc::now() - Duration::days(45);

    let mut ids = Vec::new();
    for (relevance, created_at, access_count) in [
        (0.2, old, 0),
        (0.2, Utc::now(), 0),
        (0.2, old, 3),
        (0.5, old, 0),
    ] {
        let mut memory = Memory::new("user-1", format!("fact {}", ids.len()));
        memory.relevance_score = relevance;
        memory.created_at = created_at;
        memory.updated_at = created_at;
        memory.access_count = access_count;
        ids.push(db::insert_memory(service.pool(), &memory).await.unwrap().id);
    }

    assert_eq!(service.prune_low_relevance_memories("user-1", 0.3).await.unwrap(), 1);

    let archived = db::get_memory(service.pool(), &ids[0]).await.unwrap();
    assert!(archived.is_archived());
    for id in &ids[1..] {
        assert!(!db::get_memory(service.pool(), id).await.unwrap().is_archived());
    }
}

#[test]
fn test_personal_classification() {
    assert_eq!(
        determine_memory_type("My name is Alex and I work as a nurse"),
        MemoryType::Personal
    );
}

#[tokio::test]
async fn test_summarization_boundary_and_fallback() {
    assert!(!should_summarize(&"x".repeat(200)));
    assert!(should_summarize(&"x".repeat(201)));

    let text = "y".repeat(500);
    assert_eq!(Summarizer::disabled().summarize_memory(&text).await, text);
}
