//! Memory service wired to HTTP embedding providers.

mod common;

use std::sync::Arc;

use recall_core::{SaveOptions, Summarizer};
use recall_embeddings::{EmbeddingConfig, EmbeddingProviderConfig, EmbeddingService};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ollama_service(base_url: &str, dimension: usize) -> Arc<EmbeddingService> {
    let config = EmbeddingConfig {
        providers: vec![EmbeddingProviderConfig {
            name: "ollama".to_string(),
            base_url: base_url.to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: String::new(),
            priority: 1,
        }],
        dimension,
    };
    Arc::new(EmbeddingService::from_config(&config).unwrap())
}

#[tokio::test]
async fn test_wrong_dimension_is_stored_unembedded_and_backfilled() {
    let server = MockServer::start().await;

    // The first answer comes back at the wrong size.
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.5, 0.5, 0.5]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.5, 0.5, 0.5, 0.5]
        })))
        .mount(&server)
        .await;

    let pool = common::setup_pool().await;
    let service = common::service_with(pool, ollama_service(&server.uri(), 4), Summarizer::disabled());

    let saved = service
        .save_memory("u1", "My name is John", SaveOptions::default())
        .await
        .unwrap();
    assert!(saved.embedding.is_none());
    assert!(service
        .get_relevant_memories("u1", "My name is John", 5, 0.1)
        .await
        .is_empty());

    assert_eq!(service.backfill_embeddings(Some("u1"), 10).await.unwrap(), 1);

    let results = service
        .get_relevant_memories("u1", "My name is John", 5, 0.1)
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory.id, saved.id);
    assert_eq!(results[0].memory.embedding.as_ref().map(Vec::len), Some(4));
}
