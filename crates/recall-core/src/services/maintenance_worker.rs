//! Background worker for periodic memory maintenance.
//!
//! Every interval the worker visits each user that owns memories and runs:
//! - optimization (prune, consolidate, decay)
//! - embedding backfill for rows stored while the provider was down
//! - cluster rebuild
//!
//! Users are processed with bounded concurrency. A failing step is logged
//! and counted; it does not stop the cycle or the other users.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

use super::memory::MemoryService;
use crate::config::MaintenanceConfig;
use crate::db;
use crate::Result;

/// Outcome of one maintenance cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub users: usize,
    pub pruned: usize,
    pub consolidated: usize,
    pub decayed: usize,
    pub backfilled: usize,
    pub clusters: usize,
    pub failures: usize,
}

#[derive(Default)]
struct Totals {
    pruned: AtomicUsize,
    consolidated: AtomicUsize,
    decayed: AtomicUsize,
    backfilled: AtomicUsize,
    clusters: AtomicUsize,
    failures: AtomicUsize,
}

/// Maintenance worker service.
#[derive(Clone)]
pub struct MaintenanceWorker {
    inner: Arc<MaintenanceWorkerInner>,
}

struct MaintenanceWorkerInner {
    memory: MemoryService,
    config: MaintenanceConfig,
    running: RwLock<bool>,
    shutdown: Notify,
    worker_id: String,
}

impl MaintenanceWorker {
    pub fn new(memory: MemoryService, config: MaintenanceConfig) -> Self {
        let worker_id = format!("worker-{}", nanoid::nanoid!(8));

        Self {
            inner: Arc::new(MaintenanceWorkerInner {
                memory,
                config,
                running: RwLock::new(false),
                shutdown: Notify::new(),
                worker_id,
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    pub async fn is_running(&self) -> bool {
        *self.inner.running.read().await
    }

    /// Start the background loop. The first cycle runs immediately.
    /// Returns a handle that can be used to stop the worker.
    pub async fn start(&self) -> MaintenanceWorkerHandle {
        *self.inner.running.write().await = true;

        let worker = self.clone();
        let handle = tokio::spawn(async move {
            worker.run_loop().await;
        });

        info!(
            worker_id = %self.inner.worker_id,
            interval_secs = self.inner.config.cycle_interval().as_secs(),
            concurrency = self.inner.config.concurrency,
            "Maintenance worker started"
        );

        MaintenanceWorkerHandle {
            worker: self.clone(),
            handle,
        }
    }

    /// Ask the loop to exit after the current cycle.
    pub async fn stop(&self) {
        *self.inner.running.write().await = false;
        self.inner.shutdown.notify_one();
    }

    async fn run_loop(&self) {
        loop {
            if !self.is_running().await {
                info!(worker_id = %self.inner.worker_id, "Maintenance worker stopping");
                break;
            }

            match self.run_cycle().await {
                Ok(summary) => info!(worker_id = %self.inner.worker_id, ?summary, "Maintenance cycle finished"),
                Err(e) => error!(worker_id = %self.inner.worker_id, error = %e, "Maintenance cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.inner.config.cycle_interval()) => {}
                _ = self.inner.shutdown.notified() => {}
            }
        }
    }

    /// Run one full cycle over every memory owner.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let started = Instant::now();
        let users = db::list_memory_owners(self.inner.memory.pool()).await?;
        let totals = Totals::default();

        stream::iter(users.iter())
            .for_each_concurrent(self.inner.config.concurrency.max(1), |user_id| {
                let totals = &totals;
                async move {
                    self.maintain_user(user_id, totals).await;
                }
            })
            .await;

        let summary = CycleSummary {
            users: users.len(),
            pruned: totals.pruned.into_inner(),
            consolidated: totals.consolidated.into_inner(),
            decayed: totals.decayed.into_inner(),
            backfilled: totals.backfilled.into_inner(),
            clusters: totals.clusters.into_inner(),
            failures: totals.failures.into_inner(),
        };

        metrics::histogram!("recall_maintenance_cycle_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(summary)
    }

    async fn maintain_user(&self, user_id: &str, totals: &Totals) {
        let memory = &self.inner.memory;
        debug!(user_id, "Maintaining memories");

        match memory.optimize_memory_system(user_id).await {
            Ok(report) => {
                totals.pruned.fetch_add(report.pruned, Ordering::Relaxed);
                totals.consolidated.fetch_add(report.consolidated, Ordering::Relaxed);
                totals.decayed.fetch_add(report.decayed, Ordering::Relaxed);
            }
            Err(e) => self.record_failure(user_id, "optimize", &e, totals),
        }

        match memory
            .backfill_embeddings(Some(user_id), self.inner.config.backfill_batch)
            .await
        {
            Ok(n) => {
                totals.backfilled.fetch_add(n, Ordering::Relaxed);
            }
            Err(e) => self.record_failure(user_id, "backfill", &e, totals),
        }

        match memory
            .rebuild_clusters(user_id, memory.config().cluster_threshold)
            .await
        {
            Ok(clusters) => {
                totals.clusters.fetch_add(clusters.len(), Ordering::Relaxed);
            }
            Err(e) => self.record_failure(user_id, "cluster", &e, totals),
        }
    }

    fn record_failure(&self, user_id: &str, step: &'static str, e: &crate::Error, totals: &Totals) {
        warn!(user_id, step, error = %e, "Maintenance step failed");
        metrics::counter!("recall_maintenance_failures_total", "step" => step).increment(1);
        totals.failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle to a running maintenance worker.
pub struct MaintenanceWorkerHandle {
    worker: MaintenanceWorker,
    handle: tokio::task::JoinHandle<()>,
}

impl MaintenanceWorkerHandle {
    /// Stop the worker and wait for the loop to exit.
    pub async fn stop(self) {
        self.worker.stop().await;
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Maintenance worker task ended abnormally");
        }
    }
}
