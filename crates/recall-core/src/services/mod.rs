//! Service layer for recall.
//!
//! Contains the memory operations and their building blocks:
//! - Classifier (type, tags and importance from content)
//! - Memory (writer, retriever and explicit user actions)
//! - Dedup (similarity search, consolidation, duplicate removal)
//! - Maintenance (pruning, decay, optimization, efficiency metrics, backfill)
//! - Clustering (topical grouping of memories)
//! - Extraction (memory candidates from chat messages)
//! - Summarizer (type-aware condensing of long content)
//! - MaintenanceWorker (periodic maintenance loop)

pub mod classifier;
mod clustering;
pub mod decay;
mod dedup;
mod extraction;
mod maintenance;
mod maintenance_worker;
mod memory;
pub mod summarizer;

pub use classifier::{calculate_importance_score, determine_memory_type, extract_semantic_tags};
pub use clustering::DEFAULT_CLUSTER_THRESHOLD;
pub use decay::{calculate_strength, DecayConfig};
pub use extraction::{extract_memory_candidates, ExtractionPolicy, EXTRACTION_SOURCE};
pub use maintenance::LOW_RELEVANCE_THRESHOLD;
pub use maintenance_worker::{CycleSummary, MaintenanceWorker, MaintenanceWorkerHandle};
pub use memory::{content_hash, rank_memories, MemoryService, RetrievalPlan, MERGE_SEPARATOR};
pub use summarizer::{should_summarize, Summarizer};
