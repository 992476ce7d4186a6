//! recall - long-term memory for chat assistants
//!
//! Stores facts about users, retrieves the ones relevant to a query, and
//! keeps the store healthy through deduplication, consolidation, decay and
//! pruning. All operations are plain async library calls scoped by user id.

pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use config::{Config, MaintenanceConfig, MemoryConfig};
pub use error::{Error, Result};
pub use services::{
    ExtractionPolicy, MaintenanceWorker, MaintenanceWorkerHandle, MemoryService, RetrievalPlan,
    Summarizer,
};

pub use recall_models::{
    EfficiencyMetrics, Memory, MemoryCluster, MemoryStats, MemoryType, MemoryUpdate,
    OptimizationReport, SaveOptions, ScoredMemory, SimilarMemory, ValidationLevel,
};
