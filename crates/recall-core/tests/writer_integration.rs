//! Memory writer and explicit user actions.

mod common;

use std::sync::Arc;

use recall_core::db::{self, MemoryFilter};
use recall_core::services::{content_hash, MERGE_SEPARATOR};
use recall_core::{Error, MemoryType, MemoryUpdate, SaveOptions, Summarizer};

#[tokio::test]
async fn test_save_new_memory_defaults() {
    let service = common::setup_service().await;

    let memory = service
        .save_memory(
            "u1",
            "  My name is Alex and I work as a nurse  ",
            SaveOptions::from_source("chat"),
        )
        .await
        .unwrap();

    assert_eq!(memory.content, "My name is Alex and I work as a nurse");
    assert_eq!(memory.relevance_score, 1.0);
    assert_eq!(memory.access_count, 0);
    assert_eq!(memory.memory_type, MemoryType::Personal);
    assert_eq!(memory.source.as_deref(), Some("chat"));
    assert_eq!(memory.content_hash, Some(content_hash(&memory.content)));
    assert!(memory.is_embedded());
    assert!(memory.importance_score >= 0.8);

    let stored = db::get_memory(service.pool(), &memory.id).await.unwrap();
    assert_eq!(stored.content, memory.content);
    assert_eq!(stored.embedding, memory.embedding);
    assert_eq!(stored.memory_type, MemoryType::Personal);
}

#[tokio::test]
async fn test_validation_rejects_empty_input() {
    let service = common::setup_service().await;

    let err = service
        .save_memory("u1", "   \n\t", SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    let err = service
        .save_memory("", "I like tea", SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = service
        .save_memory("u1", "hi", SaveOptions::default().strict())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert_eq!(db::count_user_memories(service.pool(), "u1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_same_content_twice_merges() {
    let service = common::setup_service().await;

    let first = service
        .save_memory("u1", "I prefer dark roast coffee", SaveOptions::default())
        .await
        .unwrap();
    let second = service
        .save_memory("u1", "I prefer dark roast coffee", SaveOptions::default())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.content, "I prefer dark roast coffee");
    assert_eq!(db::count_user_memories(service.pool(), "u1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_near_duplicate_appends_with_separator() {
    let service = common::setup_service().await;

    let first = service
        .save_memory("u1", "I really like green tea every single morning", SaveOptions::default())
        .await
        .unwrap();
    let merged = service
        .save_memory(
            "u1",
            "I really like green tea every single morning too",
            SaveOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(merged.id, first.id);
    assert_eq!(
        merged.content,
        format!(
            "I really like green tea every single morning{}I really like green tea every single morning too",
            MERGE_SEPARATOR
        )
    );
    assert_eq!(merged.content_hash, Some(content_hash(&merged.content)));
    assert_eq!(db::count_user_memories(service.pool(), "u1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_different_users_do_not_merge() {
    let service = common::setup_service().await;

    let a = service
        .save_memory("u1", "I like green tea", SaveOptions::default())
        .await
        .unwrap();
    let b = service
        .save_memory("u2", "I like green tea", SaveOptions::default())
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(b.user_id, "u2");
}

#[tokio::test]
async fn test_embedding_failure_still_stores() {
    let pool = common::setup_pool().await;
    let service = common::service_with(
        pool,
        Arc::new(common::FailingEmbedder),
        Summarizer::disabled(),
    );

    let memory = service
        .save_memory("u1", "I live in Lisbon", SaveOptions::default())
        .await
        .unwrap();
    assert!(memory.embedding.is_none());

    // Exact repeats still merge through the content hash.
    let again = service
        .save_memory("u1", "I live in Lisbon", SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(again.id, memory.id);
    assert_eq!(db::count_user_memories(service.pool(), "u1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_long_content_is_summarized() {
    let pool = common::setup_pool().await;
    let service = common::service_with(
        pool,
        common::lexical_embedder(),
        Summarizer::new(Arc::new(common::StubCompleter(
            "Working on the Atlas migration, due in March.".into(),
        ))),
    );

    let long = "We are working on the Atlas project, which migrates our billing system. ".repeat(4);
    let memory = service
        .save_memory("u1", &long, SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(memory.content, "Working on the Atlas migration, due in March.");

    let untouched = service
        .save_memory("u1", &long, SaveOptions::default().with_summarize(false))
        .await
        .unwrap();
    assert_eq!(untouched.content, long.trim());
}

#[tokio::test]
async fn test_summary_failure_keeps_original() {
    let pool = common::setup_pool().await;
    let service = common::service_with(
        pool,
        common::lexical_embedder(),
        Summarizer::new(Arc::new(common::FailingCompleter)),
    );

    let long = "Notes about the garden: tomatoes, basil and peppers grow along the fence. ".repeat(4);
    let memory = service
        .save_memory("u1", &long, SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(memory.content, long.trim());
}

#[tokio::test]
async fn test_type_override() {
    let service = common::setup_service().await;
    let memory = service
        .save_memory(
            "u1",
            "My name is Alex",
            SaveOptions::default().with_type(MemoryType::General),
        )
        .await
        .unwrap();
    assert_eq!(memory.memory_type, MemoryType::General);
}

#[tokio::test]
async fn test_ownership_is_enforced() {
    let service = common::setup_service().await;
    let memory = service
        .save_memory("u1", "I like green tea", SaveOptions::default())
        .await
        .unwrap();

    let err = service.get_memory("u2", &memory.id).await.unwrap_err();
    assert!(matches!(err, Error::Ownership { .. }));

    let err = service.delete_memory("u2", &memory.id).await.unwrap_err();
    assert_eq!(err.error_code(), "OWNERSHIP_ERROR");

    let err = service
        .update_memory("u2", &memory.id, MemoryUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Ownership { .. }));

    assert!(service.get_memory("u1", &memory.id).await.is_ok());

    let err = service.get_memory("u1", "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_update_rederives_fields() {
    let service = common::setup_service().await;
    let memory = service
        .save_memory("u1", "I like green tea", SaveOptions::default())
        .await
        .unwrap();

    let updated = service
        .update_memory(
            "u1",
            &memory.id,
            MemoryUpdate {
                content: Some("I deploy services with Kubernetes and Terraform".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.content, "I deploy services with Kubernetes and Terraform");
    assert_eq!(updated.content_hash, Some(content_hash(&updated.content)));
    assert_ne!(updated.embedding, memory.embedding);
    assert!(updated.semantic_tags.iter().any(|t| t == "kubernetes"));
    assert!(updated.updated_at >= memory.updated_at);

    let err = service
        .update_memory(
            "u1",
            &memory.id,
            MemoryUpdate {
                content: Some("  ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_delete_list_and_stats() {
    let service = common::setup_service().await;
    let a = service
        .save_memory("u1", "My name is Alex", SaveOptions::default())
        .await
        .unwrap();
    service
        .save_memory("u1", "I prefer vim over emacs", SaveOptions::default())
        .await
        .unwrap();
    service
        .save_memory("u2", "My name is Sam", SaveOptions::default())
        .await
        .unwrap();

    let stats = service.memory_stats("u1").await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.embedded, 2);
    assert_eq!(stats.archived, 0);

    service.delete_memory("u1", &a.id).await.unwrap();

    let listed = service.list_memories(&MemoryFilter::for_user("u1")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "I prefer vim over emacs");

    let err = service.delete_memory("u1", &a.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = service.list_memories(&MemoryFilter::for_user("")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_remember_from_message() {
    let service = common::setup_service().await;

    let saved = service
        .remember_from_message(
            "u1",
            "Hey! My name is John. Can you help me with this bug? I prefer TypeScript for frontend work.",
        )
        .await
        .unwrap();

    let contents: Vec<_> = saved.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["My name is John", "I prefer TypeScript for frontend work"]);
    assert!(saved.iter().all(|m| m.source.as_deref() == Some("extraction")));

    let none = service
        .remember_from_message("u1", "What time is it?")
        .await
        .unwrap();
    assert!(none.is_empty());
}
