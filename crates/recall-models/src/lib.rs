//! Data models for recall.
//!
//! Defines the core types shared by the memory core and its callers:
//! memories, clusters, request options and maintenance reports.
//! Pure data structures with no database or network dependencies.

mod cluster;
mod memory;
mod report;

pub use cluster::*;
pub use memory::*;
pub use report::*;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
